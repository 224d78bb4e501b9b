//! Outbound mail seam.
//!
//! The identity flows only compose messages and hand them to a `Mailer`;
//! transport details live behind the trait.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct MailError(pub String);

impl From<MailError> for AppError {
    fn from(error: MailError) -> AppError {
        AppError::MailDeliveryFailed(error.0)
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// Logs each message instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        log::info!(
            target: "mail",
            "to={} subject={:?} body_len={}",
            mail.to,
            mail.subject,
            mail.html.len()
        );
        log::debug!(target: "mail", "{}", mail.html);
        Ok(())
    }
}

/// Which verification message to compose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMail {
    /// Sent right after registration.
    Welcome,
    /// Sent when the user asks for a new code.
    Resend,
}

pub fn verification_link(app_base_url: &str, token: &str) -> String {
    format!("{}/verify-email/{}", app_base_url.trim_end_matches('/'), token)
}

pub fn verification_mail(
    kind: VerificationMail,
    to: &str,
    app_base_url: &str,
    token: &str,
) -> OutgoingMail {
    let link = verification_link(app_base_url, token);
    let heading = match kind {
        VerificationMail::Welcome => "Welcome to Our Platform",
        VerificationMail::Resend => "Email Verification",
    };
    OutgoingMail {
        to: to.to_string(),
        subject: "Verify Your Email Address".to_string(),
        html: format!(
            "<h2>{}</h2>\n<p>Click the link below to verify your email:</p>\n<p><a href=\"{}\">Verify Email</a></p>",
            heading, link
        ),
    }
}
