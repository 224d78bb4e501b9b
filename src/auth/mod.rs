pub mod audit;
pub mod extractors;
pub mod middleware;
pub mod oauth;
pub mod password;
pub mod session;
pub mod token;
pub mod verification;

use lazy_static::lazy_static;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use validator::Validate;

// Re-export necessary items
pub use extractors::CurrentIdentity;
pub use middleware::AuthGate;
pub use password::{hash_password, verify_password};
pub use token::{Claims, TokenKind, TokenPair, TokenPolicy, TokenService};

lazy_static! {
    // Regex for username validation: alphanumeric, underscores, hyphens
    static ref USERNAME_REGEX: regex::Regex = regex::Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// Lower-cases and trims an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// `bytes` of OS-seeded randomness, hex encoded.
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Represents the payload for a user login request.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// User's email address.
    #[validate(email)]
    pub email: String,
    /// User's password. Only presence is checked here.
    #[validate(length(min = 1))]
    pub password: String,
}

/// Represents the payload for a new user registration request.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Desired username for the new account.
    /// Must be between 3 and 32 characters, alphanumeric, and can include underscores or hyphens.
    #[validate(
        length(min = 3, max = 32),
        regex(
            path = "USERNAME_REGEX",
            message = "Username must be alphanumeric, underscores, or hyphens"
        )
    )]
    pub username: String,
    /// Email address for the new account.
    #[validate(email)]
    pub email: String,
    /// Password for the new account.
    /// Must be at least 6 characters long.
    #[validate(length(min = 6))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResendVerificationRequest {
    #[validate(email)]
    pub email: String,
}

/// The token is optional here so a missing one gets its own 400 message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Body returned by a successful email verification.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifiedResponse {
    pub success: bool,
    pub message: String,
    /// Access token for the freshly verified account.
    pub token: String,
}
