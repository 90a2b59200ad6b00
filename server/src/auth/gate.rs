//! Admission check for WebSocket upgrades.
//!
//! The token travels in the `accessToken` query parameter because browsers
//! cannot set headers on a WebSocket handshake. It is verified exactly once,
//! before the upgrade; an admitted connection is never re-checked.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::auth::jwt::{self, Claims, SigningKeys};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing access token")]
    MissingToken,
    #[error("invalid access token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingToken => StatusCode::BAD_REQUEST,
            AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Only the status goes back to the caller; the reason stays in the logs.
/// The transport is closed after the response so a refused client cannot
/// reuse it.
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), [(header::CONNECTION, "close")]).into_response()
    }
}

/// Verify the upgrade's access token and return its claims.
pub fn admit(keys: &SigningKeys, access_token: Option<&str>) -> Result<Claims, AuthError> {
    let token = access_token
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;
    Ok(jwt::validate_access_token(keys, token)?)
}
