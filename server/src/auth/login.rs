//! Local username/password accounts and token issuance.
//!
//! Accounts live in `data_dir/accounts.json`, a map from username to the
//! daemon account it unlocks:
//!
//! ```json
//! { "alice": { "accountId": "abc123", "passwordHash": "$argon2id$..." } }
//! ```

use std::collections::HashMap;
use std::path::Path;

use argon2::Argon2;
use axum::{extract::State, http::StatusCode, Json};
use password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::jwt;
use crate::state::AppState;

const ACCOUNTS_FILE: &str = "accounts.json";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("failed to read accounts file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse accounts file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("password hashing failed")]
    Hash(#[source] password_hash::Error),
    #[error("unknown user")]
    UnknownUser,
    #[error("wrong password")]
    WrongPassword,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAccount {
    pub account_id: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct AccountStore {
    accounts: HashMap<String, LocalAccount>,
}

impl AccountStore {
    pub fn new(accounts: HashMap<String, LocalAccount>) -> Self {
        Self { accounts }
    }

    /// Load `data_dir/accounts.json`. A missing file yields an empty store.
    pub fn load(data_dir: &str) -> Result<Self, AccountError> {
        let path = Path::new(data_dir).join(ACCOUNTS_FILE);
        if !path.exists() {
            tracing::warn!(
                "No accounts file at {}, login is disabled until one is created",
                path.display()
            );
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)?;
        let accounts: HashMap<String, LocalAccount> = serde_json::from_str(&raw)?;
        tracing::info!("Loaded {} local account(s) from {}", accounts.len(), path.display());
        Ok(Self { accounts })
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Check a username/password pair and return the account it unlocks.
    pub fn verify(&self, username: &str, password: &str) -> Result<&LocalAccount, AccountError> {
        let account = self
            .accounts
            .get(username)
            .ok_or(AccountError::UnknownUser)?;
        let parsed = PasswordHash::new(&account.password_hash).map_err(AccountError::Hash)?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AccountError::WrongPassword)?;
        Ok(account)
    }
}

/// Hash a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String, AccountError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(AccountError::Hash)?;
    Ok(hash.to_string())
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

/// POST /auth/login
/// Verify local credentials and issue an access token for the bound account.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, StatusCode> {
    let accounts = state.accounts.clone();
    let username = req.username.clone();

    // Argon2 verification is CPU-bound
    let account_id = tokio::task::spawn_blocking(move || {
        accounts
            .verify(&req.username, &req.password)
            .map(|account| account.account_id.clone())
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let account_id = match account_id {
        Ok(id) => id,
        Err(AccountError::UnknownUser) | Err(AccountError::WrongPassword) => {
            tracing::debug!(username = %username, "Login rejected");
            return Err(StatusCode::UNAUTHORIZED);
        }
        Err(e) => {
            tracing::error!(username = %username, error = %e, "Login failed");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let access_token = jwt::issue_access_token(
        &state.signing_keys,
        &username,
        &account_id,
        state.token_ttl_secs,
    )
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to sign access token");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    tracing::info!(username = %username, account_id = %account_id, "Access token issued");
    Ok(Json(LoginResponse { access_token }))
}
