use axum::{extract::State, routing::get, routing::post, Json, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::login;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the axum Router.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`: the
/// login rate limiter keys on the peer IP.
pub fn build_router(state: AppState) -> Router {
    // 5 login attempts per minute per IP
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(12) // 1 token every 12 seconds = 5 per minute
            .burst_size(5)
            .finish()
            .expect("static governor config is valid"),
    );
    let limiter = governor_config.limiter().clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            limiter.retain_recent();
        }
    });

    let auth_routes = Router::new()
        .route("/auth/login", post(login::login))
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Auth via query param, checked by the handler before upgrading
    let ws_routes = Router::new().route("/ws", get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(auth_routes)
        .merge(ws_routes)
        .merge(health)
        .with_state(state)
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.registry.account_count(),
    }))
}
