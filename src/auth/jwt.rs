/// JWT Token Issuance and Validation
///
/// Access and refresh tokens are signed with two different secrets, so a
/// leaked access secret cannot mint refresh tokens and vice versa.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, AuthenticatedUser, RefreshClaims, TokenType, TypedClaims};
use crate::auth::opaque_token::generate_opaque_token;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};
use crate::models::User;

pub const DEFAULT_ISSUER: &str = "cms-api";
pub const DEFAULT_AUDIENCE: &str = "cms-client";

/// Freshly minted credentials for one session
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Identifier of `refresh_token`, to be stored in the ledger
    pub jti: String,
}

#[derive(Clone)]
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: i64,
    refresh_ttl: i64,
    issuer: String,
    audience: String,
}

impl TokenIssuer {
    pub fn new(config: &JwtSettings) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl: config.access_token_expiry,
            refresh_ttl: config.refresh_token_expiry,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        }
    }

    pub fn issue_access_token(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            is_verified: user.is_verified,
            token_type: TokenType::Access,
            iat: now,
            exp: now + self.access_ttl,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        sign(&claims, &self.access_encoding)
    }

    /// Returns the signed token and its freshly generated jti.
    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<(String, String), AppError> {
        let now = Utc::now().timestamp();
        let jti = generate_opaque_token();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            jti: jti.clone(),
            token_type: TokenType::Refresh,
            iat: now,
            exp: now + self.refresh_ttl,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let token = sign(&claims, &self.refresh_encoding)?;
        Ok((token, jti))
    }

    pub fn issue_token_pair(&self, user: &User) -> Result<TokenPair, AppError> {
        let access_token = self.issue_access_token(user)?;
        let (refresh_token, jti) = self.issue_refresh_token(user.id)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            jti,
        })
    }

    /// Verifies signature, expiry, issuer, audience and `type == "access"`.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        self.decode_typed::<AccessClaims>(token, &self.access_decoding)
    }

    /// Verifies signature, expiry, issuer, audience and `type == "refresh"`.
    /// Says nothing about revocation; that is the ledger's job.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, AppError> {
        self.decode_typed::<RefreshClaims>(token, &self.refresh_decoding)
    }

    pub fn extract_user(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        self.validate_access_token(token)?.try_into()
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.leeway = 0;
        validation
    }

    fn decode_typed<T>(&self, token: &str, key: &DecodingKey) -> Result<T, AppError>
    where
        T: DeserializeOwned + TypedClaims,
    {
        let data = decode::<serde_json::Value>(token, key, &self.validation()).map_err(|e| {
            tracing::debug!("JWT validation error: {}", e);
            match e.kind() {
                ErrorKind::ExpiredSignature => AppError::Auth(AuthError::TokenExpired),
                _ => AppError::Auth(AuthError::TokenInvalid),
            }
        })?;

        let token_type = data
            .claims
            .get("type")
            .cloned()
            .and_then(|value| serde_json::from_value::<TokenType>(value).ok())
            .ok_or(AppError::Auth(AuthError::TokenInvalid))?;
        if token_type != T::EXPECTED {
            return Err(AppError::Auth(AuthError::WrongTokenType));
        }

        serde_json::from_value::<T>(data.claims)
            .map_err(|_| AppError::Auth(AuthError::TokenInvalid))
    }
}

fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> Result<String, AppError> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}
