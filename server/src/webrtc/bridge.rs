use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::daemon::{DaemonHandle, JSON_MIME};
use crate::ws::protocol::encode_envelope;
use crate::ws::{Callback, CallbackTable, MessageType, WsMessage};

/// Message types relayed to the peer account through the daemon.
pub const SIGNALING_TYPES: [MessageType; 7] = [
    MessageType::IceCandidate,
    MessageType::WebRtcOffer,
    MessageType::WebRtcAnswer,
    MessageType::CallBegin,
    MessageType::CallAccept,
    MessageType::CallRefuse,
    MessageType::CallEnd,
];

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{kind} payload is missing `{missing}`")]
    IncompleteSignalingPayload {
        kind: MessageType,
        missing: &'static str,
    },
    #[error("{0} is not a signaling message")]
    NotSignaling(MessageType),
    #[error("failed to encode {kind} for the daemon: {source}")]
    Encode {
        kind: MessageType,
        #[source]
        source: serde_json::Error,
    },
}

/// `(from, to)` of a signaling payload.
fn endpoints(message: &WsMessage) -> Result<(Option<&str>, Option<&str>), BridgeError> {
    let (from, to) = match message {
        WsMessage::CallBegin(m)
        | WsMessage::CallAccept(m)
        | WsMessage::CallRefuse(m)
        | WsMessage::CallEnd(m) => (&m.from, &m.to),
        WsMessage::WebRtcOffer(m) | WsMessage::WebRtcAnswer(m) => (&m.from, &m.to),
        WsMessage::IceCandidate(m) => (&m.from, &m.to),
        other => return Err(BridgeError::NotSignaling(other.kind())),
    };
    Ok((from.as_deref(), to.as_deref()))
}

/// Relay a signaling message to its `to` account as an `application/json`
/// account text message sent by `from`.
///
/// The sender named in the payload is trusted as-is; it is not compared with
/// the account the connection was admitted for.
///
/// The peer receives the typed message re-encoded, not the client's raw
/// frame: fields outside the message catalogue are dropped on the way.
pub fn forward_to_daemon(daemon: &DaemonHandle, message: &WsMessage) -> Result<(), BridgeError> {
    let kind = message.kind();
    let (from, to) = endpoints(message)?;
    let from = from.ok_or(BridgeError::IncompleteSignalingPayload {
        kind,
        missing: "from",
    })?;
    let to = to.ok_or(BridgeError::IncompleteSignalingPayload { kind, missing: "to" })?;

    let body = encode_envelope(message).map_err(|source| BridgeError::Encode { kind, source })?;
    let mut payloads = BTreeMap::new();
    payloads.insert(JSON_MIME.to_string(), body);

    tracing::debug!(kind = %kind, from = %from, to = %to, "Relaying signaling message");
    daemon.send_account_text_message(from, to, payloads);
    Ok(())
}

/// Bind one relay callback per signaling type.
pub fn register_signaling_bridge(table: &CallbackTable, daemon: DaemonHandle) {
    for kind in SIGNALING_TYPES {
        let daemon = daemon.clone();
        let callback: Callback = Arc::new(move |message: &WsMessage| -> anyhow::Result<()> {
            forward_to_daemon(&daemon, message)?;
            Ok(())
        });
        table.bind(kind, callback);
    }
    tracing::info!("WebRTC signaling bridge registered");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::DaemonCommand;
    use crate::ws::protocol::{
        decode_envelope, CallAction, ConversationView, IceCandidateExchange, IceCandidateInit,
    };

    #[test]
    fn test_call_begin_is_forwarded() {
        let (daemon, mut cmd_rx) = DaemonHandle::channel();
        let message = WsMessage::CallBegin(CallAction {
            from: Some("abc123".to_string()),
            to: Some("xyz789".to_string()),
            ..Default::default()
        });

        forward_to_daemon(&daemon, &message).unwrap();

        let DaemonCommand::SendAccountTextMessage {
            account_id,
            to,
            payloads,
        } = cmd_rx.try_recv().unwrap();
        assert_eq!(account_id, "abc123");
        assert_eq!(to, "xyz789");
        assert_eq!(
            payloads[JSON_MIME],
            r#"{"type":"CallBegin","data":{"from":"abc123","to":"xyz789"}}"#
        );
    }

    #[test]
    fn test_forwarded_frame_keeps_only_known_fields() {
        let (daemon, mut cmd_rx) = DaemonHandle::channel();
        let message = decode_envelope(
            r#"{"type":"CallAccept","data":{"from":"xyz789","to":"abc123","withVideoOn":true,"debug":"x"}}"#,
        )
        .unwrap();

        forward_to_daemon(&daemon, &message).unwrap();

        let DaemonCommand::SendAccountTextMessage { payloads, .. } = cmd_rx.try_recv().unwrap();
        assert_eq!(
            payloads[JSON_MIME],
            r#"{"type":"CallAccept","data":{"from":"xyz789","to":"abc123","withVideoOn":true}}"#
        );
    }

    #[test]
    fn test_missing_to_is_rejected() {
        let (daemon, mut cmd_rx) = DaemonHandle::channel();
        let message = WsMessage::IceCandidate(IceCandidateExchange {
            from: Some("abc123".to_string()),
            to: None,
            candidate: Some(IceCandidateInit {
                candidate: "candidate:1 1 udp 2122260223 10.0.0.1 54400 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_m_line_index: Some(0),
                username_fragment: None,
            }),
        });

        let err = forward_to_daemon(&daemon, &message).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::IncompleteSignalingPayload { missing: "to", .. }
        ));
        assert!(cmd_rx.try_recv().is_err());
    }

    #[test]
    fn test_missing_from_is_rejected() {
        let (daemon, _cmd_rx) = DaemonHandle::channel();
        let message = WsMessage::CallEnd(CallAction {
            to: Some("xyz789".to_string()),
            ..Default::default()
        });
        assert!(matches!(
            forward_to_daemon(&daemon, &message),
            Err(BridgeError::IncompleteSignalingPayload { missing: "from", .. })
        ));
    }

    #[test]
    fn test_non_signaling_message_rejected() {
        let (daemon, _cmd_rx) = DaemonHandle::channel();
        let message = WsMessage::ConversationView(ConversationView {
            conversation_id: "c1".to_string(),
        });
        assert!(matches!(
            forward_to_daemon(&daemon, &message),
            Err(BridgeError::NotSignaling(MessageType::ConversationView))
        ));
    }

    #[test]
    fn test_bridge_binds_every_signaling_type() {
        let table = CallbackTable::new();
        let (daemon, mut cmd_rx) = DaemonHandle::channel();
        register_signaling_bridge(&table, daemon);

        for kind in MessageType::ALL {
            let expected = usize::from(SIGNALING_TYPES.contains(&kind));
            assert_eq!(table.handler_count(kind), expected, "{kind}");
        }

        let message =
            decode_envelope(r#"{"type":"WebRtcAnswer","data":{"from":"b","to":"a","sdp":{"type":"answer","sdp":"v=0"}}}"#)
                .unwrap();
        assert_eq!(table.dispatch(&message), 1);
        assert!(cmd_rx.try_recv().is_ok());

        // Incomplete payloads still count as invoked but produce no command.
        let message = decode_envelope(r#"{"type":"IceCandidate","data":{"from":"b"}}"#).unwrap();
        assert_eq!(table.dispatch(&message), 1);
        assert!(cmd_rx.try_recv().is_err());
    }
}
