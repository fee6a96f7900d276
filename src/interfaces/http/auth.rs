//! HS256 bearer tokens and the `AuthUser` extractor.
//!
//! Tokens are issued by the marketplace's identity service; this service
//! only validates them. `generate_token` exists for tooling and tests.

use super::error::AppError;
use super::state::AppState;
use crate::error::SettlementError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ROLE_CLIENT: &str = "client";
pub const ROLE_PROVIDER: &str = "provider";
pub const ROLE_ADMIN: &str = "admin";

const DEFAULT_EXPIRY_MINS: i64 = 60;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// The user id.
    pub sub: Uuid,
    pub role: String,
    /// Present when the user owns a provider profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_profile_id: Option<Uuid>,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub expiry_mins: i64,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expiry_mins: DEFAULT_EXPIRY_MINS,
        }
    }
}

pub fn generate_token(
    user_id: Uuid,
    role: &str,
    provider_profile_id: Option<Uuid>,
    config: &JwtConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        role: role.to_string(),
        provider_profile_id,
        exp: now + config.expiry_mins * 60,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

pub fn validate_token(token: &str, config: &JwtConfig) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// The caller, taken from the `Authorization: Bearer <token>` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: String,
    pub provider_profile_id: Option<Uuid>,
}

impl AuthUser {
    /// The caller's provider profile, or `Forbidden` for users without one.
    pub fn provider_profile(&self) -> Result<Uuid, AppError> {
        self.provider_profile_id.ok_or_else(|| {
            SettlementError::Forbidden("a provider profile is required".to_string()).into()
        })
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == ROLE_ADMIN {
            Ok(())
        } else {
            Err(SettlementError::Forbidden("admin role required".to_string()).into())
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| SettlementError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            SettlementError::Unauthorized("Invalid Authorization format. Expected: Bearer <token>".into())
        })?;

        let claims = validate_token(token, &state.jwt)
            .map_err(|_| SettlementError::Unauthorized("Invalid or expired token".into()))?;

        Ok(AuthUser {
            user_id: claims.sub,
            role: claims.role,
            provider_profile_id: claims.provider_profile_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip_keeps_profile() {
        let config = JwtConfig::new("test-secret");
        let user = Uuid::new_v4();
        let profile = Uuid::new_v4();

        let token = generate_token(user, ROLE_PROVIDER, Some(profile), &config).unwrap();
        let claims = validate_token(&token, &config).unwrap();

        assert_eq!(claims.sub, user);
        assert_eq!(claims.role, ROLE_PROVIDER);
        assert_eq!(claims.provider_profile_id, Some(profile));
    }

    #[test]
    fn test_token_with_other_secret_is_rejected() {
        let token = generate_token(Uuid::new_v4(), ROLE_CLIENT, None, &JwtConfig::new("a")).unwrap();
        assert!(validate_token(&token, &JwtConfig::new("b")).is_err());
    }
}
