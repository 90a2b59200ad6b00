//! WebRTC call signaling between browser clients, carried over the daemon.
//!
//! The server never inspects SDP or ICE contents. Signaling frames from a
//! client are wrapped into account text messages addressed to the peer; the
//! peer's server turns them back into frames through the daemon event path.

pub mod bridge;

pub use bridge::{forward_to_daemon, register_signaling_bridge, BridgeError, SIGNALING_TYPES};
