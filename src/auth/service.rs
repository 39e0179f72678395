/// Authentication flows
///
/// Each method is one request/response exchange. The HTTP layer turns the
/// results into JSON bodies and cookies; nothing here knows about HTTP.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::jwt::{TokenIssuer, TokenPair};
use crate::auth::ledger::RevocationLedger;
use crate::auth::opaque_token::{generate_opaque_token, hash_token};
use crate::auth::password::{validate_new_password, PasswordHasher};
use crate::email_client::ResetTokenSender;
use crate::error::{AppError, AuthError, ValidationError};
use crate::models::{NewUser, PublicUser, User};
use crate::repository::UserStore;
use crate::validators::is_valid_email;

pub const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account exists for that email, a password reset link has been sent";
pub const RESET_PASSWORD_MESSAGE: &str = "Password has been reset, please sign in again";
pub const CHANGE_PASSWORD_MESSAGE: &str = "Password changed successfully";

/// A signed-in user together with the credentials of the new session
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: PublicUser,
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    ledger: RevocationLedger,
    tokens: TokenIssuer,
    hasher: PasswordHasher,
    reset_sender: Arc<dyn ResetTokenSender>,
    reset_token_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        ledger: RevocationLedger,
        tokens: TokenIssuer,
        hasher: PasswordHasher,
        reset_sender: Arc<dyn ResetTokenSender>,
        reset_token_ttl_seconds: i64,
    ) -> Self {
        Self {
            users,
            ledger,
            tokens,
            hasher,
            reset_sender,
            reset_token_ttl: Duration::seconds(reset_token_ttl_seconds),
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn ledger(&self) -> &RevocationLedger {
        &self.ledger
    }

    /// Create an account and open a first session.
    ///
    /// # Errors
    /// - `Validation` for a malformed email or a password under 6 characters
    /// - `AlreadyExists` if the email is taken
    pub async fn signup(&self, email: &str, password: &str) -> Result<AuthSession, AppError> {
        let email = is_valid_email(email)?;
        validate_new_password(password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AppError::AlreadyExists(
                "Email already registered".to_string(),
            ));
        }

        let password_hash = self.hasher.hash_blocking(password).await?;
        let user = self
            .users
            .insert(NewUser {
                email,
                password_hash,
                verification_token: Some(generate_opaque_token()),
            })
            .await?;

        let session = self.open_session(&user).await?;
        tracing::info!(user_id = %user.id, "User signed up");
        Ok(session)
    }

    /// Unknown email and wrong password fail identically, including the
    /// time spent hashing.
    pub async fn signin(&self, email: &str, password: &str) -> Result<AuthSession, AppError> {
        let user = match self.users.find_by_email(email).await? {
            Some(user) => user,
            None => {
                self.hasher.verify_dummy_blocking(password).await;
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !self
            .hasher
            .verify_blocking(password, &user.password_hash)
            .await?
        {
            return Err(AuthError::InvalidCredentials.into());
        }

        let session = self.open_session(&user).await?;
        tracing::info!(user_id = %user.id, "User signed in");
        Ok(session)
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// revoked atomically before anything is issued, so it works only once.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<AuthSession, AppError> {
        let token = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;
        let claims = self.tokens.validate_refresh_token(token)?;
        let user_id = claims.user_id()?;

        if !self.ledger.consume(&claims.jti).await? {
            tracing::warn!(user_id = %user_id, "Revoked or expired refresh token presented");
            return Err(AuthError::TokenRevoked.into());
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let session = self.open_session(&user).await?;
        tracing::info!(user_id = %user.id, "Token refreshed");
        Ok(session)
    }

    /// Best-effort revocation of the presented refresh token. Never fails:
    /// the client must always be able to end its session.
    pub async fn logout(&self, refresh_token: Option<&str>) {
        let Some(token) = refresh_token.filter(|t| !t.is_empty()) else {
            return;
        };

        match self.tokens.validate_refresh_token(token) {
            Ok(claims) => match self.ledger.revoke(&claims.jti).await {
                Ok(()) => tracing::info!(user_id = %claims.sub, "User logged out"),
                Err(e) => tracing::warn!(error = %e, "Failed to revoke refresh token on logout"),
            },
            Err(e) => tracing::debug!(error = %e, "Ignoring unusable refresh token on logout"),
        }
    }

    /// Current state of the user, re-read from the store.
    pub async fn me(&self, user_id: Uuid) -> Result<PublicUser, AppError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        Ok(PublicUser::from(&user))
    }

    /// Always succeeds from the caller's point of view, whether or not the
    /// account exists and whether or not delivery worked.
    pub async fn forgot_password(&self, email: &str) {
        let user = match self.users.find_by_email(email).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::info!("Password reset requested for unknown email");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Password reset lookup failed");
                return;
            }
        };

        let token = generate_opaque_token();
        let expires_at = Utc::now() + self.reset_token_ttl;
        if let Err(e) = self
            .users
            .set_reset_token(user.id, &hash_token(&token), expires_at)
            .await
        {
            tracing::error!(user_id = %user.id, error = %e, "Failed to store reset token");
            return;
        }

        match self.reset_sender.send_reset_token(&user.email, &token).await {
            Ok(()) => tracing::info!(user_id = %user.id, "Password reset token issued"),
            Err(e) => {
                tracing::error!(user_id = %user.id, error = %e, "Failed to deliver reset token")
            }
        }
    }

    /// Set a new password with a reset token and log out every session.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        validate_new_password(new_password)?;

        let user = self
            .users
            .find_by_reset_token(&hash_token(token), Utc::now())
            .await?
            .ok_or(ValidationError::InvalidResetToken)?;

        let password_hash = self.hasher.hash_blocking(new_password).await?;
        self.users.update_password(user.id, &password_hash).await?;
        self.ledger.revoke_all(user.id).await?;

        tracing::info!(user_id = %user.id, "Password reset");
        Ok(())
    }

    /// Change the password of an authenticated user.
    ///
    /// Every other session is logged out. The session whose refresh token
    /// accompanies the request (if any, and if it belongs to this user) is
    /// kept alive.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
        current_refresh_token: Option<&str>,
    ) -> Result<(), AppError> {
        validate_new_password(new_password)?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !self
            .hasher
            .verify_blocking(current_password, &user.password_hash)
            .await?
        {
            return Err(ValidationError::IncorrectPassword.into());
        }

        let password_hash = self.hasher.hash_blocking(new_password).await?;
        self.users.update_password(user.id, &password_hash).await?;

        match self.current_jti(&user, current_refresh_token) {
            Some(jti) => self.ledger.revoke_all_except(user.id, &jti).await?,
            None => self.ledger.revoke_all(user.id).await?,
        };

        tracing::info!(user_id = %user.id, "Password changed");
        Ok(())
    }

    fn current_jti(&self, user: &User, refresh_token: Option<&str>) -> Option<String> {
        let claims = self.tokens.validate_refresh_token(refresh_token?).ok()?;
        (claims.user_id().ok()? == user.id).then_some(claims.jti)
    }

    async fn open_session(&self, user: &User) -> Result<AuthSession, AppError> {
        let tokens = self.tokens.issue_token_pair(user)?;
        self.ledger.store(user.id, &tokens.jti).await?;

        Ok(AuthSession {
            user: PublicUser::from(user),
            tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::auth::password::MIN_COST;
    use crate::configuration::JwtSettings;
    use crate::repository::{InMemoryRefreshTokenStore, InMemoryUserStore};

    /// Keeps the last token per recipient
    #[derive(Default)]
    struct CapturingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl CapturingSender {
        fn last_token_for(&self, email: &str) -> Option<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(to, _)| to == email)
                .map(|(_, token)| token.clone())
        }
    }

    #[async_trait]
    impl ResetTokenSender for CapturingSender {
        async fn send_reset_token(&self, recipient: &str, token: &str) -> Result<(), AppError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), token.to_string()));
            Ok(())
        }
    }

    struct Harness {
        service: AuthService,
        users: InMemoryUserStore,
        sender: Arc<CapturingSender>,
    }

    fn harness() -> Harness {
        let jwt = JwtSettings {
            access_secret: "service-test-access-secret".to_string(),
            refresh_secret: "service-test-refresh-secret".to_string(),
            access_token_expiry: 1800,
            refresh_token_expiry: 604800,
            issuer: "test".to_string(),
            audience: "test".to_string(),
        };
        let users = InMemoryUserStore::new();
        let sender = Arc::new(CapturingSender::default());
        let ledger = RevocationLedger::new(
            Arc::new(InMemoryRefreshTokenStore::new()),
            jwt.refresh_token_expiry,
        );
        let service = AuthService::new(
            Arc::new(users.clone()),
            ledger,
            TokenIssuer::new(&jwt),
            PasswordHasher::new(MIN_COST).unwrap(),
            sender.clone(),
            3600,
        );

        Harness {
            service,
            users,
            sender,
        }
    }

    fn expect_auth_error<T: std::fmt::Debug>(result: Result<T, AppError>, expected: AuthError) {
        match result {
            Err(AppError::Auth(actual)) => assert_eq!(actual, expected),
            other => panic!("Expected {:?}, got {:?}", expected, other),
        }
    }

    fn expect_validation_error<T: std::fmt::Debug>(
        result: Result<T, AppError>,
        expected: ValidationError,
    ) {
        match result {
            Err(AppError::Validation(actual)) => assert_eq!(actual, expected),
            other => panic!("Expected {:?}, got {:?}", expected, other),
        }
    }

    #[tokio::test]
    async fn test_signup_then_signin() {
        let h = harness();

        let signed_up = h.service.signup("a@x.com", "secret1").await.unwrap();
        assert_eq!(signed_up.user.email, "a@x.com");
        assert!(!signed_up.user.is_verified);
        assert!(h.service.ledger().is_valid(&signed_up.tokens.jti).await.unwrap());

        let stored = h.users.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_ne!(stored.password_hash, "secret1");
        assert!(stored.verification_token.is_some());

        let signed_in = h.service.signin("a@x.com", "secret1").await.unwrap();
        assert_eq!(signed_in.user.id, signed_up.user.id);
        assert_ne!(signed_in.tokens.jti, signed_up.tokens.jti);
    }

    #[tokio::test]
    async fn test_signup_rejects_bad_input() {
        let h = harness();

        expect_validation_error(
            h.service.signup("a@x.com", "short").await,
            ValidationError::TooShort("password".to_string(), 6),
        );
        expect_validation_error(
            h.service.signup("", "secret1").await,
            ValidationError::EmptyField("email".to_string()),
        );
        expect_validation_error(
            h.service.signup("not-an-email", "secret1").await,
            ValidationError::InvalidFormat("email".to_string()),
        );
    }

    #[tokio::test]
    async fn test_signup_rejects_duplicate_email() {
        let h = harness();
        h.service.signup("a@x.com", "secret1").await.unwrap();

        let result = h.service.signup("a@x.com", "another1").await;
        assert!(matches!(result, Err(AppError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_signin_failures_are_indistinguishable() {
        let h = harness();
        h.service.signup("a@x.com", "secret1").await.unwrap();

        let wrong_password = h.service.signin("a@x.com", "wrong").await.unwrap_err();
        let unknown_email = h.service.signin("nouser@x.com", "whatever").await.unwrap_err();

        assert_eq!(wrong_password.to_string(), "Invalid email or password");
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
        assert_eq!(wrong_password.code(), unknown_email.code());
    }

    #[tokio::test]
    async fn test_refresh_rotates_tokens() {
        let h = harness();
        let session = h.service.signup("a@x.com", "secret1").await.unwrap();
        let old = session.tokens;

        let rotated = h.service.refresh(Some(&old.refresh_token)).await.unwrap();

        assert_eq!(rotated.user.id, session.user.id);
        assert_ne!(rotated.tokens.jti, old.jti);
        assert!(!h.service.ledger().is_valid(&old.jti).await.unwrap());
        assert!(h.service.ledger().is_valid(&rotated.tokens.jti).await.unwrap());

        expect_auth_error(
            h.service.refresh(Some(&old.refresh_token)).await,
            AuthError::TokenRevoked,
        );
    }

    #[tokio::test]
    async fn test_refresh_requires_a_refresh_token() {
        let h = harness();
        let session = h.service.signup("a@x.com", "secret1").await.unwrap();

        expect_auth_error(h.service.refresh(None).await, AuthError::MissingToken);
        expect_auth_error(h.service.refresh(Some("")).await, AuthError::MissingToken);
        expect_auth_error(
            h.service.refresh(Some("garbage")).await,
            AuthError::TokenInvalid,
        );
        expect_auth_error(
            h.service.refresh(Some(&session.tokens.access_token)).await,
            AuthError::TokenInvalid,
        );
    }

    #[tokio::test]
    async fn test_refresh_for_deleted_user() {
        let h = harness();
        let session = h.service.signup("a@x.com", "secret1").await.unwrap();
        h.users.remove(session.user.id).unwrap();

        expect_auth_error(
            h.service.refresh(Some(&session.tokens.refresh_token)).await,
            AuthError::UserNotFound,
        );
    }

    #[tokio::test]
    async fn test_logout_revokes_and_never_fails() {
        let h = harness();
        let session = h.service.signup("a@x.com", "secret1").await.unwrap();

        h.service.logout(Some(&session.tokens.refresh_token)).await;
        assert!(!h.service.ledger().is_valid(&session.tokens.jti).await.unwrap());

        // repeated, garbage and absent tokens are all fine
        h.service.logout(Some(&session.tokens.refresh_token)).await;
        h.service.logout(Some("garbage")).await;
        h.service.logout(None).await;
    }

    #[tokio::test]
    async fn test_me_reflects_the_store() {
        let h = harness();
        let session = h.service.signup("a@x.com", "secret1").await.unwrap();

        let me = h.service.me(session.user.id).await.unwrap();
        assert_eq!(me, session.user);

        h.users.remove(session.user.id).unwrap();
        expect_auth_error(h.service.me(session.user.id).await, AuthError::UserNotFound);
    }

    #[tokio::test]
    async fn test_forgot_password_stores_hashed_token() {
        let h = harness();
        h.service.signup("real@x.com", "secret1").await.unwrap();

        h.service.forgot_password("unknown@x.com").await;
        assert!(h.sender.last_token_for("unknown@x.com").is_none());

        h.service.forgot_password("real@x.com").await;
        let token = h.sender.last_token_for("real@x.com").expect("token sent");
        let user = h.users.find_by_email("real@x.com").await.unwrap().unwrap();

        assert_eq!(user.reset_token, Some(hash_token(&token)));
        let expires = user.reset_token_expires.unwrap();
        assert!(expires > Utc::now() + Duration::minutes(59));
        assert!(expires <= Utc::now() + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_reset_password_flow() {
        let h = harness();
        let session = h.service.signup("real@x.com", "secret1").await.unwrap();
        h.service.forgot_password("real@x.com").await;
        let token = h.sender.last_token_for("real@x.com").unwrap();

        expect_validation_error(
            h.service.reset_password(&token, "short").await,
            ValidationError::TooShort("password".to_string(), 6),
        );

        h.service.reset_password(&token, "newsecret").await.unwrap();

        assert!(h.service.signin("real@x.com", "newsecret").await.is_ok());
        expect_auth_error(
            h.service.signin("real@x.com", "secret1").await,
            AuthError::InvalidCredentials,
        );
        assert!(!h.service.ledger().is_valid(&session.tokens.jti).await.unwrap());

        let user = h.users.find_by_email("real@x.com").await.unwrap().unwrap();
        assert!(user.reset_token.is_none());
        assert!(user.reset_token_expires.is_none());

        // single use
        expect_validation_error(
            h.service.reset_password(&token, "another1").await,
            ValidationError::InvalidResetToken,
        );
    }

    #[tokio::test]
    async fn test_reset_token_expiring_now_is_rejected() {
        let h = harness();
        let session = h.service.signup("real@x.com", "secret1").await.unwrap();
        let token = generate_opaque_token();
        h.users
            .set_reset_token(session.user.id, &hash_token(&token), Utc::now())
            .await
            .unwrap();

        expect_validation_error(
            h.service.reset_password(&token, "newsecret").await,
            ValidationError::InvalidResetToken,
        );
    }

    #[tokio::test]
    async fn test_change_password_keeps_current_session_only() {
        let h = harness();
        let current = h.service.signup("a@x.com", "secret1").await.unwrap();
        let other = h.service.signin("a@x.com", "secret1").await.unwrap();

        h.service
            .change_password(
                current.user.id,
                "secret1",
                "secret2",
                Some(&current.tokens.refresh_token),
            )
            .await
            .unwrap();

        assert!(h.service.ledger().is_valid(&current.tokens.jti).await.unwrap());
        assert!(!h.service.ledger().is_valid(&other.tokens.jti).await.unwrap());
        assert!(h.service.signin("a@x.com", "secret2").await.is_ok());
        expect_auth_error(
            h.service.signin("a@x.com", "secret1").await,
            AuthError::InvalidCredentials,
        );
    }

    #[tokio::test]
    async fn test_change_password_without_session_revokes_everything() {
        let h = harness();
        let session = h.service.signup("a@x.com", "secret1").await.unwrap();

        h.service
            .change_password(session.user.id, "secret1", "secret2", None)
            .await
            .unwrap();

        assert!(!h.service.ledger().is_valid(&session.tokens.jti).await.unwrap());
    }

    #[tokio::test]
    async fn test_change_password_ignores_foreign_refresh_token() {
        let h = harness();
        let alice = h.service.signup("alice@x.com", "secret1").await.unwrap();
        let bob = h.service.signup("bob@x.com", "secret1").await.unwrap();

        h.service
            .change_password(
                alice.user.id,
                "secret1",
                "secret2",
                Some(&bob.tokens.refresh_token),
            )
            .await
            .unwrap();

        assert!(!h.service.ledger().is_valid(&alice.tokens.jti).await.unwrap());
        assert!(h.service.ledger().is_valid(&bob.tokens.jti).await.unwrap());
    }

    #[tokio::test]
    async fn test_change_password_rejects_wrong_current_password() {
        let h = harness();
        let session = h.service.signup("a@x.com", "secret1").await.unwrap();

        expect_validation_error(
            h.service
                .change_password(session.user.id, "wrong", "secret2", None)
                .await,
            ValidationError::IncorrectPassword,
        );
        expect_validation_error(
            h.service
                .change_password(session.user.id, "secret1", "123", None)
                .await,
            ValidationError::TooShort("password".to_string(), 6),
        );
        assert!(h.service.ledger().is_valid(&session.tokens.jti).await.unwrap());
    }
}
