/// Access and refresh token encoding
///
/// Access and refresh tokens are signed with distinct HS256 secrets and carry
/// a `token_type` claim, so a refresh token can never pass as an access token
/// (or the reverse) even if the secrets were misconfigured to match.
///
/// Every token gets a random `jti`; two tokens minted for the same user in the
/// same second are still distinct strings, which the rotation check relies on.
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::User;

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;
const ACCESS_TOKEN_TYPE: &str = "access";
const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Claims carried by an access token: subject plus a profile snapshot
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    pub sub: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub token_type: String,
}

impl AccessClaims {
    pub fn user_id(&self) -> Result<Uuid> {
        parse_subject(&self.sub)
    }
}

/// Claims carried by a refresh token: the subject only
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RefreshClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub token_type: String,
}

impl RefreshClaims {
    pub fn user_id(&self) -> Result<Uuid> {
        parse_subject(&self.sub)
    }
}

fn parse_subject(sub: &str) -> Result<Uuid> {
    Uuid::parse_str(sub).map_err(|_| AppError::Unauthorized("Invalid subject in token".into()))
}

/// Signing material and lifetimes, constructed once at startup
#[derive(Clone)]
pub struct JwtKeys {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(AppError::Internal("JWT secrets must not be empty".into()));
        }
        if access_secret == refresh_secret {
            return Err(AppError::Internal(
                "Access and refresh token secrets must differ".into(),
            ));
        }

        Ok(Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn generate_access_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
        };

        encode(&Header::new(JWT_ALGORITHM), &claims, &self.access_encoding)
            .map_err(|e| AppError::Internal(format!("Failed to generate access token: {e}")))
    }

    pub fn generate_refresh_token(&self, user_id: Uuid) -> Result<String> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: REFRESH_TOKEN_TYPE.to_string(),
        };

        encode(&Header::new(JWT_ALGORITHM), &claims, &self.refresh_encoding)
            .map_err(|e| AppError::Internal(format!("Failed to generate refresh token: {e}")))
    }

    /// Check signature and expiry of an access token
    pub fn decode_access(&self, token: &str) -> Result<AccessClaims> {
        let data = decode::<AccessClaims>(token, &self.access_decoding, &strict_validation())?;
        if data.claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AppError::Unauthorized("Not an access token".into()));
        }
        Ok(data.claims)
    }

    /// Check signature and expiry of a refresh token
    pub fn decode_refresh(&self, token: &str) -> Result<RefreshClaims> {
        let data = decode::<RefreshClaims>(token, &self.refresh_decoding, &strict_validation())?;
        if data.claims.token_type != REFRESH_TOKEN_TYPE {
            return Err(AppError::Unauthorized("Not a refresh token".into()));
        }
        Ok(data.claims)
    }
}

fn strict_validation() -> Validation {
    let mut validation = Validation::new(JWT_ALGORITHM);
    validation.validate_exp = true;
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);
    validation
}

/// Hex-encoded SHA-256 digest; the record store only ever sees this form of a
/// refresh token.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
