//! Persistence seams
//!
//! The service only talks to these traits. `postgres` is the production
//! implementation, `memory` keeps everything in process for tests and
//! local experiments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewUser, RefreshTokenRecord, User};

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryRefreshTokenStore, InMemoryUserStore};
pub use postgres::{PgRefreshTokenStore, PgUserStore};

/// Credential store
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Insert a user.
    ///
    /// # Errors
    /// * `AppError::AlreadyExists` - email already taken
    async fn insert(&self, user: NewUser) -> Result<User, AppError>;

    /// Exact, case-sensitive email match
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Replace the password digest and clear any outstanding reset token.
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError>;

    /// Store a (hashed) reset token and its expiry, replacing any previous one.
    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// User whose reset token matches and whose `reset_token_expires > now`.
    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError>;
}

/// Storage behind the revocation ledger
#[async_trait]
pub trait RefreshTokenStore: Send + Sync + 'static {
    /// Insert a new, non-revoked row.
    ///
    /// # Errors
    /// Fails if `jti` already exists; an existing row is never overwritten.
    async fn insert(
        &self,
        jti: &str,
        user_id: Uuid,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn find(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Mark one row revoked. Already revoked rows keep their `revoked_at`.
    async fn revoke(&self, jti: &str, now: DateTime<Utc>) -> Result<(), AppError>;

    /// Atomically revoke the row if it is still active at `now`. Returns
    /// whether this call performed the revocation.
    async fn revoke_if_active(&self, jti: &str, now: DateTime<Utc>) -> Result<bool, AppError>;

    /// Revoke every non-revoked row of a user, optionally sparing one jti.
    /// Returns the number of rows revoked.
    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        except_jti: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError>;

    /// Delete rows with `expires_at < now OR revoked`. Returns the count.
    async fn delete_disposable(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}
