/// Error Handling Module
///
/// One error type for the whole service, split into domain-specific
/// sub-errors so call sites stay precise:
/// 1. Validation errors (malformed or missing input, weak passwords)
/// 2. Authentication errors (credentials, tokens)
/// 3. Database errors (classified from sqlx)
/// 4. HTTP mapping with a stable machine-readable code per category
/// 5. Structured error logging

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    EmptyField(String),
    #[error("{0} must be at least {1} characters")]
    TooShort(String, usize),
    #[error("{0} is too long (maximum {1} characters)")]
    TooLong(String, usize),
    #[error("{0} has invalid format")]
    InvalidFormat(String),
    #[error("Malformed request body: {0}")]
    MalformedBody(String),
    #[error("Invalid or expired reset token")]
    InvalidResetToken,
    #[error("Current password is incorrect")]
    IncorrectPassword,
}

/// Authentication errors. Every variant maps to 401.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Shared by "unknown email" and "wrong password" so the two are
    /// indistinguishable to the caller.
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Missing authentication token")]
    MissingToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Invalid token")]
    TokenInvalid,
    #[error("Invalid token: wrong type")]
    WrongTokenType,
    #[error("Refresh token revoked or expired")]
    TokenRevoked,
    #[error("User not found")]
    UserNotFound,
}

/// Database operation errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Duplicate entry: {0}")]
    UniqueConstraintViolation(String),
    #[error("Database connection error: {0}")]
    ConnectionPool(String),
    #[error("Database error: {0}")]
    UnexpectedError(String),
}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    AlreadyExists(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable, machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "invalid_argument",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::Auth(_) => "unauthenticated",
            AppError::Database(_) | AppError::Internal(_) => "internal",
        }
    }

    /// Message safe to show to clients. Persistence and internal failures are
    /// reduced to a generic text.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(e) => e.to_string(),
            AppError::AlreadyExists(msg) => msg.clone(),
            AppError::Auth(e) => e.to_string(),
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                AppError::Database(DatabaseError::UniqueConstraintViolation(
                    db.constraint().unwrap_or("unique").to_string(),
                ))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Database(DatabaseError::ConnectionPool(err.to_string()))
            }
            _ => AppError::Database(DatabaseError::UnexpectedError(err.to_string())),
        }
    }
}

/// ============================================================================
/// 3. HTTP RESPONSE MAPPING
/// ============================================================================

/// Error body returned to clients
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Unique error ID, also present in the server log line
    pub error_id: String,
    /// Machine-readable category
    pub code: String,
    /// Human-readable message
    pub message: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, code: String, message: String, status: u16) -> Self {
        Self {
            error_id,
            code,
            message,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl AppError {
    fn log(&self, error_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Validation error");
            }
            AppError::AlreadyExists(msg) => {
                tracing::warn!(error_id = error_id, error = %msg, "Duplicate entry attempt");
            }
            AppError::Auth(AuthError::InvalidCredentials) => {
                tracing::warn!(error_id = error_id, "Invalid credentials attempt");
            }
            AppError::Auth(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Authentication error");
            }
            AppError::Database(e) => {
                tracing::error!(error_id = error_id, error = %e, "Database error");
            }
            AppError::Internal(msg) => {
                tracing::error!(error_id = error_id, error = %msg, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_id = uuid::Uuid::new_v4().to_string();
        self.log(&error_id);

        let status = self.status_code();
        HttpResponse::build(status).json(ErrorResponse::new(
            error_id,
            self.code().to_string(),
            self.public_message(),
            status.as_u16(),
        ))
    }
}
