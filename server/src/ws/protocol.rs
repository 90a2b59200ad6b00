//! Wire protocol for browser clients.
//!
//! Every frame is a UTF-8 JSON text message shaped as `{"type": ..., "data": ...}`.
//! The set of types is closed: a frame whose type is not listed in
//! [`MessageType`] is dropped before it reaches the dispatch table.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::ws::dispatch::CallbackTable;

/// Closed enumeration of the message types understood by server and clients.
///
/// The discriminant doubles as the slot index in the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    ConversationMessage,
    ConversationView,
    OnComposingStatusChanged,
    CallBegin,
    CallAccept,
    CallRefuse,
    CallEnd,
    WebRtcOffer,
    WebRtcAnswer,
    IceCandidate,
}

impl MessageType {
    pub const ALL: [MessageType; 10] = [
        MessageType::ConversationMessage,
        MessageType::ConversationView,
        MessageType::OnComposingStatusChanged,
        MessageType::CallBegin,
        MessageType::CallAccept,
        MessageType::CallRefuse,
        MessageType::CallEnd,
        MessageType::WebRtcOffer,
        MessageType::WebRtcAnswer,
        MessageType::IceCandidate,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConversationMessage => "ConversationMessage",
            Self::ConversationView => "ConversationView",
            Self::OnComposingStatusChanged => "OnComposingStatusChanged",
            Self::CallBegin => "CallBegin",
            Self::CallAccept => "CallAccept",
            Self::CallRefuse => "CallRefuse",
            Self::CallEnd => "CallEnd",
            Self::WebRtcOffer => "WebRtcOffer",
            Self::WebRtcAnswer => "WebRtcAnswer",
            Self::IceCandidate => "IceCandidate",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EnvelopeError::UnknownType(s.to_string()))
    }
}

// --- Payloads ---

/// A single conversation entry as delivered by the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub id: String,
    pub author: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub conversation_id: String,
    pub message: ConversationEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposingStatus {
    pub conversation_id: String,
    pub contact_id: String,
    pub is_writing: bool,
}

/// Call lifecycle payload shared by begin/accept/refuse/end.
///
/// `from` and `to` are optional here so that an incomplete payload still
/// decodes and can be rejected by the signaling bridge with a precise reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_video_on: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
}

/// WebRTC offer or answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdpExchange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<SessionDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateInit {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateExchange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<IceCandidateInit>,
}

/// A decoded envelope: one variant per [`MessageType`], each with its own payload.
///
/// Serializes to exactly `{"type": "<Variant>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    ConversationMessage(ConversationMessage),
    ConversationView(ConversationView),
    OnComposingStatusChanged(ComposingStatus),
    CallBegin(CallAction),
    CallAccept(CallAction),
    CallRefuse(CallAction),
    CallEnd(CallAction),
    WebRtcOffer(SdpExchange),
    WebRtcAnswer(SdpExchange),
    IceCandidate(IceCandidateExchange),
}

impl WsMessage {
    pub fn kind(&self) -> MessageType {
        match self {
            Self::ConversationMessage(_) => MessageType::ConversationMessage,
            Self::ConversationView(_) => MessageType::ConversationView,
            Self::OnComposingStatusChanged(_) => MessageType::OnComposingStatusChanged,
            Self::CallBegin(_) => MessageType::CallBegin,
            Self::CallAccept(_) => MessageType::CallAccept,
            Self::CallRefuse(_) => MessageType::CallRefuse,
            Self::CallEnd(_) => MessageType::CallEnd,
            Self::WebRtcOffer(_) => MessageType::WebRtcOffer,
            Self::WebRtcAnswer(_) => MessageType::WebRtcAnswer,
            Self::IceCandidate(_) => MessageType::IceCandidate,
        }
    }

    /// Build the typed message for `kind` from its raw `data` object.
    pub fn from_parts(kind: MessageType, data: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            MessageType::ConversationMessage => {
                Self::ConversationMessage(serde_json::from_value(data)?)
            }
            MessageType::ConversationView => Self::ConversationView(serde_json::from_value(data)?),
            MessageType::OnComposingStatusChanged => {
                Self::OnComposingStatusChanged(serde_json::from_value(data)?)
            }
            MessageType::CallBegin => Self::CallBegin(serde_json::from_value(data)?),
            MessageType::CallAccept => Self::CallAccept(serde_json::from_value(data)?),
            MessageType::CallRefuse => Self::CallRefuse(serde_json::from_value(data)?),
            MessageType::CallEnd => Self::CallEnd(serde_json::from_value(data)?),
            MessageType::WebRtcOffer => Self::WebRtcOffer(serde_json::from_value(data)?),
            MessageType::WebRtcAnswer => Self::WebRtcAnswer(serde_json::from_value(data)?),
            MessageType::IceCandidate => Self::IceCandidate(serde_json::from_value(data)?),
        })
    }
}

// --- Codec ---

/// Why an inbound frame was dropped.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("envelope is missing the `{0}` field")]
    MissingField(&'static str),
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: MessageType,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    data: Option<Value>,
}

/// Decode and validate a text frame into a typed message.
pub fn decode_envelope(text: &str) -> Result<WsMessage, EnvelopeError> {
    let raw: RawEnvelope = serde_json::from_str(text).map_err(EnvelopeError::Malformed)?;
    let kind = raw.kind.ok_or(EnvelopeError::MissingField("type"))?;
    let data = raw.data.ok_or(EnvelopeError::MissingField("data"))?;
    let kind: MessageType = kind.parse()?;
    WsMessage::from_parts(kind, data)
        .map_err(|source| EnvelopeError::InvalidPayload { kind, source })
}

/// Encode a message to the same `{type, data}` shape clients send.
pub fn encode_envelope(message: &WsMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Handle an incoming text frame from an admitted connection.
///
/// Invalid frames are logged and dropped; the connection stays open.
/// Returns the number of callbacks invoked.
pub fn handle_text_frame(text: &str, dispatch: &CallbackTable, account_id: &str) -> usize {
    match decode_envelope(text) {
        Ok(message) => dispatch.dispatch(&message),
        Err(e) => {
            tracing::warn!(
                account_id = %account_id,
                error = %e,
                "Dropping invalid WebSocket frame"
            );
            0
        }
    }
}
