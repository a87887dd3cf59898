/**
 * Bearer Token Helpers
 *
 * The tracking core never mints or verifies tokens; it only peeks at the
 * claims of the opaque bearer value to read the driver id and the expiry
 * before attempting a connection. The signature is NOT checked here.
 */
use crate::shared::TrackingError;
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims the driver client reads from its bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Expiration time (Unix timestamp, seconds)
    #[serde(default)]
    pub exp: Option<i64>,
    /// Driver / user identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Role granted by the issuer
    #[serde(default)]
    pub role: Option<String>,
}

/// Driver credentials: a stable identifier plus the opaque bearer value
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub driver_id: String,
    pub token: String,
}

impl Credentials {
    pub fn new(driver_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            driver_id: driver_id.into(),
            token: token.into(),
        }
    }

    /// Build credentials from a token alone, taking the driver id from its claims
    pub fn from_token(token: impl Into<String>) -> Result<Self, TrackingError> {
        let token = token.into();
        let driver_id = decode_claims(&token)?
            .id
            .ok_or_else(|| TrackingError::token("token has no id claim"))?;
        Ok(Self { driver_id, token })
    }
}

// Keep the bearer value out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("driver_id", &self.driver_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Decode the token's claims locally, without verifying its signature
pub fn decode_claims(token: &str) -> Result<TokenClaims, TrackingError> {
    let header = decode_header(token).map_err(|e| TrackingError::token(e.to_string()))?;

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| TrackingError::token(e.to_string()))?;
    Ok(data.claims)
}

/// Whether the token is still usable at `now` (Unix seconds).
///
/// Undecodable tokens and tokens without an `exp` claim count as expired.
pub fn is_token_valid_at(token: &str, now: i64) -> bool {
    match decode_claims(token) {
        Ok(TokenClaims { exp: Some(exp), .. }) => exp > now,
        Ok(_) => false,
        Err(e) => {
            tracing::warn!("Invalid token: {}", e);
            false
        }
    }
}

/// Whether the token is still usable right now
pub fn is_token_valid(token: &str) -> bool {
    is_token_valid_at(token, chrono::Utc::now().timestamp())
}
