//! Postgres-backed stores. Every statement commits on its own; the only
//! read-modify-write that matters (refresh rotation) is a single UPDATE.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, DatabaseError};
use crate::models::{NewUser, RefreshTokenRecord, User};
use crate::repository::{RefreshTokenStore, UserStore};

const USER_COLUMNS: &str = "id, email, password_hash, is_verified, verification_token, \
     reset_token, reset_token_expires, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, AppError> {
        let now = Utc::now();
        let query = format!(
            r#"
            INSERT INTO users (id, email, password_hash, is_verified, verification_token, created_at, updated_at)
            VALUES ($1, $2, $3, false, $4, $5, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.verification_token)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                    AppError::AlreadyExists("Email already registered".to_string())
                }
                other => other,
            })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1, reset_token = NULL, reset_token_expires = NULL, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(password_hash)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_token = $1, reset_token_expires = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(token_hash)
        .bind(expires_at)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let query = format!(
            "SELECT {} FROM users WHERE reset_token = $1 AND reset_token_expires > $2",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(
        &self,
        jti: &str,
        user_id: Uuid,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (jti, user_id, created_at, expires_at, revoked)
            VALUES ($1, $2, $3, $4, false)
            "#,
        )
        .bind(jti)
        .bind(user_id)
        .bind(created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                AppError::Internal("Refresh token identifier collision".to_string())
            }
            other => other,
        })?;
        Ok(())
    }

    async fn find(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT jti, user_id, created_at, expires_at, revoked, revoked_at
            FROM refresh_tokens
            WHERE jti = $1
            "#,
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn revoke(&self, jti: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = $1
            WHERE jti = $2 AND revoked = false
            "#,
        )
        .bind(now)
        .bind(jti)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_if_active(&self, jti: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let revoked = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = $1
            WHERE jti = $2 AND revoked = false AND expires_at > $1
            RETURNING jti
            "#,
        )
        .bind(now)
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;
        Ok(revoked.is_some())
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        except_jti: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = $1
            WHERE user_id = $2 AND revoked = false AND ($3::TEXT IS NULL OR jti <> $3)
            "#,
        )
        .bind(now)
        .bind(user_id)
        .bind(except_jti)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_disposable(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE expires_at < $1 OR revoked = true
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
