/// Refresh Token Revocation Ledger
///
/// One row per issued refresh token, keyed by its jti. A refresh token is
/// trusted only while its row exists, is not revoked and has not expired,
/// regardless of how valid its signature is.
/// - `revoked` only ever goes from false to true
/// - rows are physically removed only by the cleanup sweep

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::repository::RefreshTokenStore;

#[derive(Clone)]
pub struct RevocationLedger {
    store: Arc<dyn RefreshTokenStore>,
    ttl: Duration,
}

impl RevocationLedger {
    /// `ttl_seconds` should match the refresh token lifetime.
    pub fn new(store: Arc<dyn RefreshTokenStore>, ttl_seconds: i64) -> Self {
        Self {
            store,
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Record a newly issued refresh token.
    ///
    /// # Errors
    /// Fails if the jti is already present.
    pub async fn store(&self, user_id: Uuid, jti: &str) -> Result<(), AppError> {
        let now = Utc::now();
        self.store.insert(jti, user_id, now, now + self.ttl).await
    }

    /// True iff the row exists, is not revoked and `expires_at > now`.
    pub async fn is_valid(&self, jti: &str) -> Result<bool, AppError> {
        let now = Utc::now();
        Ok(self
            .store
            .find(jti)
            .await?
            .map_or(false, |record| record.is_active_at(now)))
    }

    /// Idempotent.
    pub async fn revoke(&self, jti: &str) -> Result<(), AppError> {
        self.store.revoke(jti, Utc::now()).await
    }

    /// Check-and-revoke in one step, for rotation. Of two concurrent callers
    /// presenting the same jti, at most one gets `true`.
    pub async fn consume(&self, jti: &str) -> Result<bool, AppError> {
        self.store.revoke_if_active(jti, Utc::now()).await
    }

    /// Force logout everywhere.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self
            .store
            .revoke_all_for_user(user_id, None, Utc::now())
            .await?;
        tracing::info!(user_id = %user_id, revoked, "All refresh tokens revoked for user");
        Ok(revoked)
    }

    /// Like `revoke_all`, but leaves `keep_jti` alone.
    pub async fn revoke_all_except(&self, user_id: Uuid, keep_jti: &str) -> Result<u64, AppError> {
        let revoked = self
            .store
            .revoke_all_for_user(user_id, Some(keep_jti), Utc::now())
            .await?;
        tracing::info!(
            user_id = %user_id,
            revoked,
            "Refresh tokens revoked for user, current session kept"
        );
        Ok(revoked)
    }

    /// Remove expired and revoked rows.
    pub async fn purge(&self) -> Result<u64, AppError> {
        self.store.delete_disposable(Utc::now()).await
    }
}
