//! Binding to the Jami daemon.
//!
//! The daemon is an opaque peer. Commands go out on an unbounded channel to
//! a driver task (IPC link or in-process loopback); events come back on a
//! second channel and are routed to WebSocket clients by [`events`].

pub mod events;
pub mod ipc;
pub mod loopback;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

pub use ipc::DaemonError;

/// Payload key carrying a JSON-encoded WebSocket envelope in account messages.
pub const JSON_MIME: &str = "application/json";

/// Commands sent from the server to the daemon driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "method",
    content = "params",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum DaemonCommand {
    /// Send a text message from a local account to a peer, keyed by mime type.
    SendAccountTextMessage {
        account_id: String,
        to: String,
        payloads: BTreeMap<String, String>,
    },
}

/// Events emitted by the daemon driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "signal",
    content = "args",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum DaemonEvent {
    /// A peer sent a text message to a local account.
    AccountMessageReceived {
        account_id: String,
        from: String,
        payloads: BTreeMap<String, String>,
    },
    /// A new entry was appended to a conversation of a local account.
    ConversationMessageReceived {
        account_id: String,
        conversation_id: String,
        message: BTreeMap<String, String>,
    },
    /// A peer started or stopped composing in a conversation.
    ComposingStatusChanged {
        account_id: String,
        conversation_id: String,
        from: String,
        is_writing: bool,
    },
}

/// Cloneable handle for sending commands to the daemon driver.
#[derive(Debug, Clone)]
pub struct DaemonHandle {
    cmd_tx: mpsc::UnboundedSender<DaemonCommand>,
}

impl DaemonHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<DaemonCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Create a handle together with the receiver a driver consumes.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DaemonCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        (Self::new(cmd_tx), cmd_rx)
    }

    /// Queue an account-to-account text message.
    ///
    /// Fire-and-forget: nothing is awaited and daemon-side failures are not
    /// reported back. If the driver has stopped the message is dropped with a
    /// warning.
    pub fn send_account_text_message(
        &self,
        account_id: &str,
        to: &str,
        payloads: BTreeMap<String, String>,
    ) {
        let command = DaemonCommand::SendAccountTextMessage {
            account_id: account_id.to_string(),
            to: to.to_string(),
            payloads,
        };
        if self.cmd_tx.send(command).is_err() {
            tracing::warn!(
                account_id = %account_id,
                to = %to,
                "Daemon driver is gone, account message dropped"
            );
        }
    }
}
