//! Inbound path: daemon events become envelopes on the owning account's
//! WebSocket connections.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

use super::{DaemonEvent, JSON_MIME};
use crate::ws::protocol::{self, ComposingStatus, ConversationEntry, ConversationMessage};
use crate::ws::{SessionRegistry, WsMessage};

/// Consume daemon events until the driver hangs up.
pub async fn run_event_consumer(
    mut evt_rx: mpsc::UnboundedReceiver<DaemonEvent>,
    registry: SessionRegistry,
) {
    while let Some(event) = evt_rx.recv().await {
        route_event(&registry, event);
    }
    tracing::info!("Daemon event stream closed");
}

/// Translate one event and push it to the account's connections.
///
/// Returns whether at least one connection received it. Nothing is queued
/// for accounts without a connection.
pub fn route_event(registry: &SessionRegistry, event: DaemonEvent) -> bool {
    let (account_id, message) = match event {
        DaemonEvent::AccountMessageReceived {
            account_id,
            from,
            payloads,
        } => {
            let Some(body) = payloads.get(JSON_MIME) else {
                tracing::debug!(
                    account_id = %account_id,
                    from = %from,
                    "Account message without a JSON payload, ignoring"
                );
                return false;
            };
            match protocol::decode_envelope(body) {
                Ok(message) => (account_id, message),
                Err(e) => {
                    tracing::warn!(
                        account_id = %account_id,
                        from = %from,
                        error = %e,
                        "Dropping undecodable peer envelope"
                    );
                    return false;
                }
            }
        }
        DaemonEvent::ConversationMessageReceived {
            account_id,
            conversation_id,
            message,
        } => {
            let Some(entry) = conversation_entry(&message) else {
                tracing::warn!(
                    account_id = %account_id,
                    conversation_id = %conversation_id,
                    "Conversation entry lacks id, author or type"
                );
                return false;
            };
            (
                account_id,
                WsMessage::ConversationMessage(ConversationMessage {
                    conversation_id,
                    message: entry,
                }),
            )
        }
        DaemonEvent::ComposingStatusChanged {
            account_id,
            conversation_id,
            from,
            is_writing,
        } => (
            account_id,
            WsMessage::OnComposingStatusChanged(ComposingStatus {
                conversation_id,
                contact_id: from,
                is_writing,
            }),
        ),
    };

    let delivered = registry.send(&account_id, &message);
    if !delivered {
        tracing::debug!(
            account_id = %account_id,
            kind = %message.kind(),
            "No active session, message not delivered"
        );
    }
    delivered
}

fn conversation_entry(fields: &BTreeMap<String, String>) -> Option<ConversationEntry> {
    Some(ConversationEntry {
        id: fields.get("id")?.clone(),
        author: fields.get("author")?.clone(),
        kind: fields.get("type")?.clone(),
        body: fields.get("body").cloned(),
        timestamp: fields.get("timestamp").cloned(),
    })
}
