//! Access token claims.
//!
//! Tokens are only inspected here, never trusted: the backend validates the
//! signature on every request.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use super::AuthError;
use crate::models::auth::AuthUser;

/// Claims read from an access token payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub role: Option<String>,
}

impl AccessClaims {
    pub fn user(&self) -> AuthUser {
        AuthUser {
            id: self.sub.clone(),
            email: self.email.clone(),
        }
    }
}

/// Decode the payload of `token` without verifying its signature or expiry.
pub fn peek(token: &str) -> Result<AccessClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::InvalidSession(format!("unreadable access token: {e}")))
}
