use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::auth::gate;
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for the WebSocket upgrade.
/// Browsers cannot set headers on a WebSocket handshake, so the token rides in the URL.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    #[serde(rename = "accessToken")]
    pub access_token: Option<String>,
}

/// GET /ws?accessToken=JWT
/// Admission happens before the upgrade: a refused request gets a plain
/// HTTP error (400 missing token, 401 invalid or expired) and no socket.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match gate::admit(&state.signing_keys, params.access_token.as_deref()) {
        Ok(claims) => {
            tracing::info!(
                username = %claims.sub,
                account_id = %claims.account_id,
                "WebSocket connection admitted"
            );
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, claims.account_id))
        }
        Err(err) => {
            tracing::debug!(error = %err, "WebSocket admission denied");
            err.into_response()
        }
    }
}
