//! In-process stores. Same contracts as the Postgres ones; every operation
//! holds the mutex for its whole duration, which gives the compare-and-swap
//! semantics rotation relies on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewUser, RefreshTokenRecord, User};
use crate::repository::{RefreshTokenStore, UserStore};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, AppError> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal("In-memory store lock poisoned".to_string()))
}

#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<Mutex<HashMap<Uuid, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a user, as the external user-management endpoints would.
    pub fn remove(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(lock(&self.users)?.remove(&id))
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, AppError> {
        let mut users = lock(&self.users)?;
        if users.values().any(|u| u.email == user.email) {
            return Err(AppError::AlreadyExists(
                "Email already registered".to_string(),
            ));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            is_verified: false,
            verification_token: user.verification_token,
            reset_token: None,
            reset_token_expires: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(lock(&self.users)?
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(lock(&self.users)?.get(&id).cloned())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        if let Some(user) = lock(&self.users)?.get_mut(&id) {
            user.password_hash = password_hash.to_string();
            user.reset_token = None;
            user.reset_token_expires = None;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Some(user) = lock(&self.users)?.get_mut(&id) {
            user.reset_token = Some(token_hash.to_string());
            user.reset_token_expires = Some(expires_at);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        Ok(lock(&self.users)?
            .values()
            .find(|u| {
                u.reset_token.as_deref() == Some(token_hash)
                    && u.reset_token_expires.map_or(false, |expires| expires > now)
            })
            .cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRefreshTokenStore {
    records: Arc<Mutex<HashMap<String, RefreshTokenRecord>>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, AppError> {
        Ok(lock(&self.records)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, AppError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn insert(
        &self,
        jti: &str,
        user_id: Uuid,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut records = lock(&self.records)?;
        if records.contains_key(jti) {
            return Err(AppError::Internal(
                "Refresh token identifier collision".to_string(),
            ));
        }
        records.insert(
            jti.to_string(),
            RefreshTokenRecord {
                jti: jti.to_string(),
                user_id,
                created_at,
                expires_at,
                revoked: false,
                revoked_at: None,
            },
        );
        Ok(())
    }

    async fn find(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        Ok(lock(&self.records)?.get(jti).cloned())
    }

    async fn revoke(&self, jti: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(record) = lock(&self.records)?.get_mut(jti) {
            if !record.revoked {
                record.revoked = true;
                record.revoked_at = Some(now);
            }
        }
        Ok(())
    }

    async fn revoke_if_active(&self, jti: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        match lock(&self.records)?.get_mut(jti) {
            Some(record) if record.is_active_at(now) => {
                record.revoked = true;
                record.revoked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        except_jti: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut revoked = 0;
        for record in lock(&self.records)?.values_mut() {
            if record.user_id == user_id
                && !record.revoked
                && except_jti != Some(record.jti.as_str())
            {
                record.revoked = true;
                record.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn delete_disposable(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut records = lock(&self.records)?;
        let before = records.len();
        records.retain(|_, record| !record.is_disposable_at(now));
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "$2b$10$digest".to_string(),
            verification_token: Some("verify".to_string()),
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let store = InMemoryUserStore::new();
        store.insert(new_user("a@x.com")).await.unwrap();

        let result = store.insert(new_user("a@x.com")).await;
        assert!(matches!(result, Err(AppError::AlreadyExists(_))));

        // case-sensitive as stored
        assert!(store.insert(new_user("A@x.com")).await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_token_lookup_requires_strictly_future_expiry() {
        let store = InMemoryUserStore::new();
        let user = store.insert(new_user("a@x.com")).await.unwrap();
        let now = Utc::now();

        store.set_reset_token(user.id, "hash", now).await.unwrap();
        assert!(store.find_by_reset_token("hash", now).await.unwrap().is_none());

        store
            .set_reset_token(user.id, "hash", now + Duration::seconds(1))
            .await
            .unwrap();
        assert!(store.find_by_reset_token("hash", now).await.unwrap().is_some());
        assert!(store.find_by_reset_token("other", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_password_clears_reset_token() {
        let store = InMemoryUserStore::new();
        let user = store.insert(new_user("a@x.com")).await.unwrap();
        let expires = Utc::now() + Duration::hours(1);
        store.set_reset_token(user.id, "hash", expires).await.unwrap();

        store.update_password(user.id, "$2b$10$new").await.unwrap();

        let user = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.password_hash, "$2b$10$new");
        assert!(user.reset_token.is_none());
        assert!(user.reset_token_expires.is_none());
        assert!(user.updated_at >= user.created_at);
    }

    #[tokio::test]
    async fn test_revoke_if_active_only_succeeds_once() {
        let store = InMemoryRefreshTokenStore::new();
        let now = Utc::now();
        store
            .insert("jti", Uuid::new_v4(), now, now + Duration::days(7))
            .await
            .unwrap();

        assert!(store.revoke_if_active("jti", now).await.unwrap());
        assert!(!store.revoke_if_active("jti", now).await.unwrap());
        assert!(!store.revoke_if_active("missing", now).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_all_spares_the_excepted_jti() {
        let store = InMemoryRefreshTokenStore::new();
        let user_id = Uuid::new_v4();
        let other_user = Uuid::new_v4();
        let now = Utc::now();
        let expires = now + Duration::days(7);
        for jti in ["a", "b", "c"] {
            store.insert(jti, user_id, now, expires).await.unwrap();
        }
        store.insert("d", other_user, now, expires).await.unwrap();

        let revoked = store
            .revoke_all_for_user(user_id, Some("b"), now)
            .await
            .unwrap();

        assert_eq!(revoked, 2);
        assert!(store.find("a").await.unwrap().unwrap().revoked);
        assert!(!store.find("b").await.unwrap().unwrap().revoked);
        assert!(!store.find("d").await.unwrap().unwrap().revoked);
    }

    #[test]
    fn test_poisoned_store_reports_an_error() {
        let store = InMemoryRefreshTokenStore::new();
        let records = store.records.clone();
        let _ = std::thread::spawn(move || {
            let _guard = records.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(matches!(store.len(), Err(AppError::Internal(_))));
        assert!(store.is_empty().is_err());
    }
}
