//! JSON-lines link to a daemon sidecar over TCP.
//!
//! Each command is written as one line (`{"method": ..., "params": ...}`)
//! and each event arrives as one line (`{"signal": ..., "args": ...}`).
//! There is no reconnection: when the link drops the loop returns an error.

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::{DaemonCommand, DaemonEvent};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("failed to connect to daemon at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("daemon link I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode daemon command: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("daemon closed the link")]
    Closed,
}

/// Encode a command as a single newline-terminated line.
pub fn encode_command(command: &DaemonCommand) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(command)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_event(line: &str) -> Result<DaemonEvent, serde_json::Error> {
    serde_json::from_str(line)
}

/// Connect to the daemon and pump commands out and events in until either
/// side closes. Returns `Ok` when the command channel is closed (shutdown).
pub async fn run_ipc_loop(
    addr: &str,
    mut cmd_rx: mpsc::UnboundedReceiver<DaemonCommand>,
    evt_tx: mpsc::UnboundedSender<DaemonEvent>,
) -> Result<(), DaemonError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| DaemonError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    tracing::info!("Connected to daemon at {}", addr);

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => {
                        let line = encode_command(&cmd)?;
                        write_half.write_all(line.as_bytes()).await?;
                    }
                    None => {
                        tracing::info!("Daemon command channel closed, shutting down");
                        return Ok(());
                    }
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match decode_event(&line) {
                        Ok(event) => {
                            if evt_tx.send(event).is_err() {
                                tracing::info!("Daemon event consumer gone, shutting down");
                                return Ok(());
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Skipping undecodable daemon event");
                        }
                    },
                    None => return Err(DaemonError::Closed),
                }
            }
        }
    }
}
