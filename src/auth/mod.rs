use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config;
use crate::guard::{GuardError, Principal};

/// Token claims. `tenant` and `role` are optional on the wire so that a
/// token missing either decodes and is then rejected as a malformed
/// principal rather than silently defaulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(principal: &Principal) -> Self {
        let now = Utc::now();
        let expiry_hours = config::config().security.jwt_expiry_hours;
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: principal.id().0,
            tenant: Some(principal.tenant_id().0),
            role: Some(principal.role().as_str().to_string()),
            exp,
            iat: now.timestamp(),
        }
    }

    pub fn principal(&self) -> Result<Principal, GuardError> {
        Principal::from_parts(Some(self.sub), self.tenant, self.role.as_deref())
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("JWT secret not configured")]
    InvalidSecret,

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),

    #[error("Token does not describe a valid principal: {0}")]
    MalformedPrincipal(#[from] GuardError),

    #[error("Password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
}

fn secret() -> Result<&'static [u8], AuthError> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err(AuthError::InvalidSecret);
    }
    Ok(secret.as_bytes())
}

pub fn generate_jwt(claims: &Claims) -> Result<String, AuthError> {
    let encoding_key = EncodingKey::from_secret(secret()?);
    encode(&Header::default(), claims, &encoding_key).map_err(|e| AuthError::TokenGeneration(e.to_string()))
}

pub fn decode_jwt(token: &str) -> Result<Claims, AuthError> {
    let decoding_key = DecodingKey::from_secret(secret()?);
    let token_data = decode::<Claims>(token, &decoding_key, &Validation::default())
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    Ok(token_data.claims)
}

pub fn issue_token(principal: &Principal) -> Result<String, AuthError> {
    generate_jwt(&Claims::new(principal))
}

/// Decode a bearer token into the principal it was issued for
pub fn verify_token(token: &str) -> Result<Principal, AuthError> {
    Ok(decode_jwt(token)?.principal()?)
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, config::config().security.bcrypt_cost)?)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    Ok(bcrypt::verify(password, hash)?)
}
