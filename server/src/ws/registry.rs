use axum::extract::ws::{Message, Utf8Bytes};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ws::protocol::{encode_envelope, WsMessage};

/// Sender half of a connection's outbound channel; the writer task owns the receiver.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// An admitted WebSocket connection.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    sender: ConnectionSender,
}

impl Connection {
    pub fn new(sender: ConnectionSender) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Open connections per account.
///
/// A user can have multiple concurrent connections (multiple devices/tabs);
/// all of them receive every message sent to the account. Each account entry
/// is guarded by its DashMap shard lock, so admission, removal and fan-out on
/// one account never interleave. Accounts with no connections are removed.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    connections: Arc<DashMap<String, Vec<Connection>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a connection to the account's list, creating the entry if needed.
    pub fn admit(&self, account_id: &str, connection: Connection) {
        let mut connections = self.connections.entry(account_id.to_string()).or_default();
        if !connections.iter().any(|c| c.id == connection.id) {
            connections.push(connection);
        }

        tracing::debug!(
            account_id = %account_id,
            connections = connections.len(),
            "Connection registered"
        );
    }

    /// Remove a connection; drops the account entry once its last connection is gone.
    /// Returns false if the connection was not registered.
    pub fn remove(&self, account_id: &str, connection_id: ConnectionId) -> bool {
        let Entry::Occupied(mut entry) = self.connections.entry(account_id.to_string()) else {
            return false;
        };

        let connections = entry.get_mut();
        let removed = match connections.iter().position(|c| c.id == connection_id) {
            Some(pos) => {
                connections.remove(pos);
                true
            }
            None => false,
        };
        let remaining = connections.len();
        if remaining == 0 {
            entry.remove();
        }

        tracing::debug!(
            account_id = %account_id,
            connection_id = %connection_id,
            remaining = remaining,
            "Connection unregistered"
        );
        removed
    }

    /// Send a message to every open connection of an account.
    ///
    /// Returns false when the account has no open connection; that is an
    /// expected outcome, not a failure. Delivery is fire-and-forget.
    pub fn send(&self, account_id: &str, message: &WsMessage) -> bool {
        let Some(connections) = self.connections.get(account_id) else {
            return false;
        };

        let frame: Utf8Bytes = match encode_envelope(message) {
            Ok(text) => text.into(),
            Err(e) => {
                tracing::error!(
                    account_id = %account_id,
                    message_type = %message.kind(),
                    error = %e,
                    "Failed to encode outbound message"
                );
                return false;
            }
        };

        for connection in connections.value().iter() {
            // A closed receiver means the connection is shutting down; its
            // actor removes it from the registry on exit.
            let _ = connection.sender.send(Message::Text(frame.clone()));
        }
        true
    }

    pub fn connection_count(&self, account_id: &str) -> usize {
        self.connections
            .get(account_id)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    pub fn account_count(&self) -> usize {
        self.connections.len()
    }
}
