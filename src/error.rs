//!
//! # Custom Error Handling
//!
//! This module defines `AppError`, the one error type every identity flow returns.
//! Each variant carries a stable machine-readable kind (see [`AppError::kind`]) that is
//! written into the JSON body next to a human message, so clients can branch on the
//! kind without parsing text.
//!
//! Client-shaped failures (bad credentials, duplicate email, rejected tokens) map to
//! 4xx responses directly. Unexpected failures (store, signing, mail transport) are
//! logged in full here and reach the client only as a generic 500.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

const GENERIC_SERVER_ERROR: &str = "An unexpected error occurred. Please try again later.";

/// Represents all possible errors that can occur within the application.
#[derive(Debug, Error)]
pub enum AppError {
    /// Registration (or a first federated login) collided with an existing email.
    #[error("User already exists with this email address.")]
    DuplicateEmail,

    /// No identity matches the supplied email.
    #[error("No account found with this email address.")]
    AccountNotFound,

    /// A bearer token verified, but the identity it names no longer exists (HTTP 401).
    #[error("User not found")]
    UnknownTokenSubject,

    /// Resend was requested for an account that has already completed verification.
    #[error("Your email is already verified.")]
    AlreadyVerified,

    /// Verification token is unknown, consumed or expired. Deliberately vague.
    #[error("The verification token is invalid or has expired. Please request a new one.")]
    InvalidOrExpiredToken,

    /// Email/password pair did not authenticate.
    #[error("Incorrect email or password.")]
    InvalidCredentials,

    /// Login refused because the account has not verified its email yet.
    #[error("Please verify your email address before logging in.")]
    EmailNotVerified,

    /// No usable bearer token on a protected request.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// Bearer token was malformed, mis-signed, expired or of the wrong kind.
    /// The payload is the underlying reason, surfaced as `details`.
    #[error("Invalid token")]
    InvalidToken(String),

    /// Refresh token is not the account's current one or failed verification.
    #[error("Invalid refresh token.")]
    InvalidRefreshToken,

    /// Another login replaced the refresh token between read and write.
    #[error("A concurrent login updated this account. Please try again.")]
    RefreshTokenConflict,

    /// The mail collaborator failed to deliver a verification message.
    #[error("mail delivery failed: {0}")]
    MailDeliveryFailed(String),

    /// The federated identity provider failed or returned an unusable assertion.
    #[error("identity provider failure: {0}")]
    UpstreamFederationFailure(String),

    /// Represents a client-side error due to a malformed or invalid request (HTTP 400).
    #[error("{0}")]
    BadRequest(String),

    /// Represents a situation where a requested resource was not found (HTTP 404).
    #[error("{0}")]
    NotFound(String),

    /// Input validation failed (HTTP 422 Unprocessable Entity).
    #[error("{0}")]
    ValidationError(String),

    /// Error originating from the identity store.
    #[error("database error: {0}")]
    DatabaseError(String),

    /// Any other unexpected server-side failure.
    #[error("internal error: {0}")]
    InternalServerError(String),
}

impl AppError {
    /// Stable identifier written to the `error` field of every error body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::DuplicateEmail => "duplicate_email",
            AppError::AccountNotFound | AppError::UnknownTokenSubject => "account_not_found",
            AppError::AlreadyVerified => "already_verified",
            AppError::InvalidOrExpiredToken => "invalid_or_expired_token",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::EmailNotVerified => "email_not_verified",
            AppError::AuthenticationRequired => "authentication_required",
            AppError::InvalidToken(_) => "invalid_token",
            AppError::InvalidRefreshToken => "invalid_refresh_token",
            AppError::RefreshTokenConflict => "refresh_token_conflict",
            AppError::MailDeliveryFailed(_) => "mail_delivery_failed",
            AppError::UpstreamFederationFailure(_) => "upstream_federation_failure",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::ValidationError(_) => "validation_error",
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => "internal_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::DuplicateEmail
            | AppError::AlreadyVerified
            | AppError::InvalidOrExpiredToken
            | AppError::InvalidCredentials
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthenticationRequired
            | AppError::InvalidToken(_)
            | AppError::InvalidRefreshToken
            | AppError::UnknownTokenSubject => StatusCode::UNAUTHORIZED,
            AppError::EmailNotVerified => StatusCode::FORBIDDEN,
            AppError::AccountNotFound | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RefreshTokenConflict => StatusCode::CONFLICT,
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UpstreamFederationFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::MailDeliveryFailed(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = match self {
            AppError::InvalidToken(details) => json!({
                "error": self.kind(),
                "message": self.to_string(),
                "details": details,
            }),
            _ if status.is_server_error() => {
                log::error!("request failed ({}): {}", self.kind(), self);
                json!({ "error": self.kind(), "message": GENERIC_SERVER_ERROR })
            }
            _ => json!({ "error": self.kind(), "message": self.to_string() }),
        };
        HttpResponse::build(status).json(body)
    }
}

/// Converts `sqlx::Error` into `AppError::DatabaseError`.
///
/// Lookups use `fetch_optional`, so `RowNotFound` only appears on paths that
/// expected a row and is still an internal fault.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        AppError::DatabaseError(error.to_string())
    }
}

/// Converts `validator::ValidationErrors` into `AppError::ValidationError`.
impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::ValidationError(error.to_string())
    }
}
