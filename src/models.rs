//! Persisted records and their public projections.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Row of the `users` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub verification_token: Option<String>,
    /// SHA-256 of the outstanding reset token
    pub reset_token: Option<String>,
    pub reset_token_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values needed to create a user. Timestamps and id come from the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub verification_token: Option<String>,
}

/// The only user view that leaves the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub is_verified: bool,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            is_verified: user.is_verified,
        }
    }
}

/// Row of the `refresh_tokens` table (the revocation ledger)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub jti: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    /// Trusted iff not revoked and strictly before its expiry.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }

    /// Eligible for the cleanup sweep.
    pub fn is_disposable_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked || self.expires_at < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(expires_at: DateTime<Utc>, revoked: bool) -> RefreshTokenRecord {
        RefreshTokenRecord {
            jti: "jti".to_string(),
            user_id: Uuid::new_v4(),
            created_at: Utc::now(),
            expires_at,
            revoked,
            revoked_at: None,
        }
    }

    #[test]
    fn test_record_activity() {
        let now = Utc::now();

        assert!(record(now + Duration::seconds(1), false).is_active_at(now));
        assert!(!record(now, false).is_active_at(now));
        assert!(!record(now + Duration::days(1), true).is_active_at(now));
    }

    #[test]
    fn test_record_disposability() {
        let now = Utc::now();

        assert!(record(now - Duration::seconds(1), false).is_disposable_at(now));
        assert!(record(now + Duration::days(1), true).is_disposable_at(now));
        assert!(!record(now + Duration::days(1), false).is_disposable_at(now));
    }
}
