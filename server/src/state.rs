use std::sync::Arc;

use crate::auth::{AccountStore, SigningKeys};
use crate::daemon::DaemonHandle;
use crate::webrtc;
use crate::ws::{CallbackTable, SessionRegistry};

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Open WebSocket connections per daemon account
    pub registry: SessionRegistry,
    /// Per-type callbacks for inbound client frames
    pub dispatch: Arc<CallbackTable>,
    /// Ed25519 key pair for issuing and verifying access tokens
    pub signing_keys: Arc<SigningKeys>,
    /// Local login accounts
    pub accounts: Arc<AccountStore>,
    /// Lifetime of issued access tokens
    pub token_ttl_secs: i64,
}

impl AppState {
    /// Build the state with a fresh registry and a dispatch table that has
    /// the signaling bridge to `daemon` already bound.
    pub fn new(
        signing_keys: SigningKeys,
        accounts: AccountStore,
        token_ttl_secs: i64,
        daemon: &DaemonHandle,
    ) -> Self {
        let dispatch = CallbackTable::new();
        webrtc::register_signaling_bridge(&dispatch, daemon.clone());

        Self {
            registry: SessionRegistry::new(),
            dispatch: Arc::new(dispatch),
            signing_keys: Arc::new(signing_keys),
            accounts: Arc::new(accounts),
            token_ttl_secs,
        }
    }
}
