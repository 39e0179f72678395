/// JWT Claims structures
///
/// Payloads of the two token kinds. Both carry a `type` discriminator so a
/// token of one kind is never accepted where the other is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AuthError};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    pub email: String,
    pub is_verified: bool,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Claims for refresh tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    pub sub: String,
    /// Revocation ledger key
    pub jti: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Common access to the discriminator, used by the validator.
pub trait TypedClaims {
    const EXPECTED: TokenType;
}

impl TypedClaims for AccessClaims {
    const EXPECTED: TokenType = TokenType::Access;
}

impl TypedClaims for RefreshClaims {
    const EXPECTED: TokenType = TokenType::Refresh;
}

fn parse_subject(sub: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(sub).map_err(|_| AppError::Auth(AuthError::TokenInvalid))
}

impl AccessClaims {
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        parse_subject(&self.sub)
    }
}

impl RefreshClaims {
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        parse_subject(&self.sub)
    }
}

/// What an access token says about its bearer. Injected into requests by
/// the JWT middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub is_verified: bool,
}

impl TryFrom<AccessClaims> for AuthenticatedUser {
    type Error = AppError;

    fn try_from(claims: AccessClaims) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: claims.user_id()?,
            email: claims.email,
            is_verified: claims.is_verified,
        })
    }
}
