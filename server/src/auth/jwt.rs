use std::path::Path;

use chrono::Utc;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::SigningKey;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// `iss` claim of every token this server issues and accepts.
pub const TOKEN_ISSUER: &str = "urn:jami-web:server";

/// `aud` claim of every token this server issues and accepts.
pub const TOKEN_AUDIENCE: &str = "urn:jami-web:client";

const PRIVATE_KEY_FILE: &str = "jwt_private.pem";
const PUBLIC_KEY_FILE: &str = "jwt_public.pem";

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Local username the token was issued to
    pub sub: String,
    /// Daemon account the connection is bound to
    #[serde(rename = "accountId")]
    pub account_id: String,
    pub iss: String,
    pub aud: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Ed25519 key pair used to sign (login) and verify (WebSocket admission) tokens.
#[derive(Clone)]
pub struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    pub fn from_pem(
        private_pem: &[u8],
        public_pem: &[u8],
    ) -> Result<Self, jsonwebtoken::errors::Error> {
        Ok(Self {
            encoding: EncodingKey::from_ed_pem(private_pem)?,
            decoding: DecodingKey::from_ed_pem(public_pem)?,
        })
    }

    /// Generate a fresh key pair in memory.
    pub fn generate() -> Result<Self, Box<dyn std::error::Error>> {
        let (private_pem, public_pem) = generate_pem_pair()?;
        Ok(Self::from_pem(private_pem.as_bytes(), public_pem.as_bytes())?)
    }
}

/// Generate an Ed25519 key pair as (PKCS#8 private PEM, SPKI public PEM).
pub fn generate_pem_pair() -> Result<(String, String), Box<dyn std::error::Error>> {
    let secret: [u8; 32] = rand::rng().random();
    let signing_key = SigningKey::from_bytes(&secret);
    let private_pem = signing_key.to_pkcs8_pem(LineEnding::LF)?;
    let public_pem = signing_key
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)?;
    Ok((private_pem.to_string(), public_pem))
}

/// Load the token signing key pair from data_dir, generating it on first boot.
///
/// Keys are stored as PEM in `data_dir/jwt_private.pem` and
/// `data_dir/jwt_public.pem`. A deployment can provision its own pair by
/// placing both files there before startup.
pub fn load_or_generate_signing_keys(
    data_dir: &str,
) -> Result<SigningKeys, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;
    let private_path = Path::new(data_dir).join(PRIVATE_KEY_FILE);
    let public_path = Path::new(data_dir).join(PUBLIC_KEY_FILE);

    if private_path.exists() && public_path.exists() {
        let private_pem = std::fs::read(&private_path)?;
        let public_pem = std::fs::read(&public_path)?;
        let keys = SigningKeys::from_pem(&private_pem, &public_pem)?;
        tracing::info!("Token signing keys loaded from {}", data_dir);
        return Ok(keys);
    }

    if private_path.exists() != public_path.exists() {
        tracing::warn!("Only one token key file present in {}, regenerating the pair", data_dir);
    }

    let (private_pem, public_pem) = generate_pem_pair()?;
    std::fs::write(&private_path, &private_pem)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&private_path, std::fs::Permissions::from_mode(0o600))?;
    }
    std::fs::write(&public_path, &public_pem)?;
    tracing::info!("Token signing keys generated in {}", data_dir);

    Ok(SigningKeys::from_pem(
        private_pem.as_bytes(),
        public_pem.as_bytes(),
    )?)
}

/// Issue an access token binding `username` to `account_id` for `ttl_secs`.
pub fn issue_access_token(
    keys: &SigningKeys,
    username: &str,
    account_id: &str,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: username.to_string(),
        account_id: account_id.to_string(),
        iss: TOKEN_ISSUER.to_string(),
        aud: TOKEN_AUDIENCE.to_string(),
        iat: now,
        exp: now + ttl_secs,
    };

    encode(&Header::new(Algorithm::EdDSA), &claims, &keys.encoding)
}

/// Validate signature, issuer, audience and expiry; return the claims.
pub fn validate_access_token(
    keys: &SigningKeys,
    token: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.set_issuer(&[TOKEN_ISSUER]);
    validation.set_audience(&[TOKEN_AUDIENCE]);
    validation.leeway = 0;
    let token_data = decode::<Claims>(token, &keys.decoding, &validation)?;
    Ok(token_data.claims)
}
