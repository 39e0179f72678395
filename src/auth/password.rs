/// Password Hashing and Verification
///
/// Wraps bcrypt. Every hash is freshly salted, so two hashes of the same
/// password differ while both verify. Comparison is done by bcrypt itself.

use bcrypt::{hash, verify};

use crate::error::{AppError, ValidationError};

/// Lowest work factor accepted, whatever the configuration says.
pub const MIN_COST: u32 = 10;
pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    /// Digest of a throwaway password, verified against when the account
    /// does not exist so that both signin failure paths cost one bcrypt run.
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self, AppError> {
        let cost = cost.max(MIN_COST);
        let dummy_hash = hash("dummy-password-for-timing", cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        Ok(Self { cost, dummy_hash })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password for storage
    ///
    /// # Errors
    /// - `ValidationError::EmptyField` for an empty password
    /// - `AppError::Internal` if bcrypt fails
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        if password.is_empty() {
            return Err(ValidationError::EmptyField("password".to_string()).into());
        }

        hash(password, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a stored digest
    pub fn verify(&self, password: &str, digest: &str) -> Result<bool, AppError> {
        verify(password, digest)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
    }

    /// Burn the same amount of work as a real verification. The result is
    /// always discarded.
    pub fn verify_dummy(&self, password: &str) {
        let _ = verify(password, &self.dummy_hash);
    }

    /// `hash` on the blocking pool.
    pub async fn hash_blocking(&self, password: &str) -> Result<String, AppError> {
        let hasher = self.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
    }

    /// `verify` on the blocking pool.
    pub async fn verify_blocking(&self, password: &str, digest: &str) -> Result<bool, AppError> {
        let hasher = self.clone();
        let password = password.to_string();
        let digest = digest.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &digest))
            .await
            .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))?
    }

    /// `verify_dummy` on the blocking pool.
    pub async fn verify_dummy_blocking(&self, password: &str) {
        let hasher = self.clone();
        let password = password.to_string();
        let _ = tokio::task::spawn_blocking(move || hasher.verify_dummy(&password)).await;
    }
}

/// Checks a password chosen by the user (signup, reset, change).
pub fn validate_new_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        ));
    }
    Ok(())
}
