use crate::error::AppError;
use bcrypt::{hash, verify, DEFAULT_COST};
use lazy_static::lazy_static;

lazy_static! {
    /// Compared against when there is no stored hash, so a miss costs the same as a mismatch.
    static ref DECOY_HASH: Option<String> = hash("decoy-password", DEFAULT_COST).ok();
}

/// One-way salted hash of a plaintext password.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::InternalServerError(format!("Failed to hash password: {}", e)))
}

/// Checks a plaintext password against a stored bcrypt hash.
///
/// A malformed stored hash is an internal fault, not a failed match.
pub fn verify_password(password: &str, hashed_password: &str) -> Result<bool, AppError> {
    verify(password, hashed_password)
        .map_err(|e| AppError::InternalServerError(format!("Failed to verify password: {}", e)))
}

/// Verifies `password` against an optional hash.
///
/// A missing hash (unknown account, or federated only) never matches, but
/// still pays for one bcrypt verification.
pub fn matches_stored(password: &str, stored: Option<&str>) -> Result<bool, AppError> {
    match stored {
        Some(hashed) => verify_password(password, hashed),
        None => {
            if let Some(decoy) = DECOY_HASH.as_deref() {
                let _ = verify(password, decoy);
            }
            Ok(false)
        }
    }
}
