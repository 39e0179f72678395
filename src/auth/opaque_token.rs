/// Opaque random tokens
///
/// Used for refresh-token identifiers (jti), password reset tokens and
/// email verification tokens. 32 random bytes, hex encoded.

use rand::{thread_rng, RngCore};
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 of a token, hex encoded. Reset tokens are stored this way so a
/// leaked `users` table does not hand out working reset links.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
