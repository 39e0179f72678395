/// Authentication module
///
/// Password hashing, JWT issuance/validation, the refresh-token revocation
/// ledger and the flows built on top of them.

mod claims;
mod jwt;
mod ledger;
mod opaque_token;
mod password;
mod service;

pub use claims::{AccessClaims, AuthenticatedUser, RefreshClaims, TokenType};
pub use jwt::{TokenIssuer, TokenPair, DEFAULT_AUDIENCE, DEFAULT_ISSUER};
pub use ledger::RevocationLedger;
pub use opaque_token::{generate_opaque_token, hash_token};
pub use password::{validate_new_password, PasswordHasher, MIN_COST, MIN_PASSWORD_LENGTH};
pub use service::{
    AuthService, AuthSession, CHANGE_PASSWORD_MESSAGE, FORGOT_PASSWORD_MESSAGE,
    RESET_PASSWORD_MESSAGE,
};
