//! In-process daemon stand-in for single-server deployments and tests.
//!
//! Account ids double as peer URIs: a text message from `a` to `b` is
//! delivered straight back as an `AccountMessageReceived` event for `b`.

use tokio::sync::mpsc;

use super::{DaemonCommand, DaemonEvent};

/// Turn a command into the event the addressed local account would observe.
pub fn reflect(command: DaemonCommand) -> DaemonEvent {
    match command {
        DaemonCommand::SendAccountTextMessage {
            account_id,
            to,
            payloads,
        } => DaemonEvent::AccountMessageReceived {
            account_id: to,
            from: account_id,
            payloads,
        },
    }
}

pub async fn run_loopback(
    mut cmd_rx: mpsc::UnboundedReceiver<DaemonCommand>,
    evt_tx: mpsc::UnboundedSender<DaemonEvent>,
) {
    tracing::info!("Using in-process loopback daemon");
    while let Some(command) = cmd_rx.recv().await {
        if evt_tx.send(reflect(command)).is_err() {
            break;
        }
    }
    tracing::info!("Loopback daemon stopped");
}
