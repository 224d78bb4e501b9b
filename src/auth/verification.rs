//! Email verification workflow.
//!
//! An identity is `Unverified` with one pending token until that token is
//! consumed, which makes it `Verified` for good. Issuing a new token (resend)
//! overwrites the old one, which can then never be used again.

use chrono::{DateTime, Duration, Utc};

use super::audit::{AuthEvent, VerificationFailure};
use super::password::hash_password;
use super::{normalize_email, random_token, RegisterRequest};
use crate::error::AppError;
use crate::mail::{verification_mail, VerificationMail};
use crate::models::Identity;
use crate::state::AppState;
use crate::store::IdentityStore;

/// Bytes of entropy in a verification token, hex encoded on the wire.
pub const VERIFICATION_TOKEN_BYTES: usize = 20;

pub fn verification_ttl() -> Duration {
    Duration::hours(1)
}

/// Puts a fresh pending token on `identity` (without persisting it).
fn attach_pending(identity: &mut Identity, now: DateTime<Utc>) -> String {
    let token = random_token(VERIFICATION_TOKEN_BYTES);
    identity.set_pending_verification(token.clone(), now + verification_ttl());
    token
}

/// Issues and persists a new pending token, replacing any previous one.
pub async fn begin_verification(
    store: &dyn IdentityStore,
    identity: &mut Identity,
    now: DateTime<Utc>,
) -> Result<String, AppError> {
    let token = attach_pending(identity, now);
    store.save(identity).await?;
    Ok(token)
}

/// Consumes `token` if it is the current pending token and `now` is before its expiry.
///
/// Unknown, consumed and expired tokens all fail with the same
/// `InvalidOrExpiredToken`; only the audit trail tells them apart.
pub async fn complete_verification(
    state: &AppState,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Identity, AppError> {
    let reject = |reason| {
        state.audit.record(AuthEvent::VerificationRejected { reason });
        AppError::InvalidOrExpiredToken
    };

    let mut identity = match state.store.find_by_verification_token(token).await? {
        Some(identity) => identity,
        None => return Err(reject(VerificationFailure::UnknownToken)),
    };
    if !identity.verification_pending_at(now) {
        return Err(reject(VerificationFailure::Expired));
    }

    identity.mark_verified();
    state.store.save(&identity).await?;
    state.audit.record(AuthEvent::Verified {
        identity_id: identity.id,
    });
    Ok(identity)
}

/// Replaces the pending token of the unverified account registered under `email`.
pub async fn resend(
    store: &dyn IdentityStore,
    email: &str,
    now: DateTime<Utc>,
) -> Result<(Identity, String), AppError> {
    let mut identity = store
        .find_by_email(&normalize_email(email))
        .await?
        .ok_or(AppError::AccountNotFound)?;
    if identity.is_verified {
        return Err(AppError::AlreadyVerified);
    }
    let token = begin_verification(store, &mut identity, now).await?;
    Ok((identity, token))
}

/// Creates an unverified password account and mails its verification link.
///
/// Expects an already validated request. A mail failure fails the whole
/// operation; the account stays and can ask for a resend.
pub async fn register(state: &AppState, request: &RegisterRequest) -> Result<Identity, AppError> {
    let email = normalize_email(&request.email);
    if state.store.find_by_email(&email).await?.is_some() {
        return Err(AppError::DuplicateEmail);
    }

    let password_hash = hash_password(&request.password)?;
    let mut identity =
        Identity::with_password(request.username.trim().to_string(), email, password_hash);
    let token = attach_pending(&mut identity, Utc::now());
    let identity = state.store.create(identity).await?;

    state.audit.record(AuthEvent::Registered {
        identity_id: identity.id,
    });
    send_verification(state, &identity, &token, VerificationMail::Welcome).await?;
    Ok(identity)
}

/// `resend`, followed by mailing the new link.
pub async fn resend_verification(state: &AppState, email: &str) -> Result<(), AppError> {
    let (identity, token) = resend(state.store.as_ref(), email, Utc::now()).await?;
    send_verification(state, &identity, &token, VerificationMail::Resend).await
}

async fn send_verification(
    state: &AppState,
    identity: &Identity,
    token: &str,
    kind: VerificationMail,
) -> Result<(), AppError> {
    let mail = verification_mail(kind, &identity.email, &state.settings.app_base_url, token);
    state.mailer.send(mail).await?;
    state.audit.record(AuthEvent::VerificationIssued {
        identity_id: identity.id,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::audit::RecordingAuditSink;
    use crate::auth::token::{TokenPolicy, TokenService};
    use crate::mail::{MailError, Mailer, OutgoingMail};
    use crate::store::MemoryIdentityStore;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Outbox(Mutex<Vec<OutgoingMail>>);

    #[async_trait]
    impl Mailer for Outbox {
        async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
            self.0.lock().unwrap().push(mail);
            Ok(())
        }
    }

    struct BrokenMailer;

    #[async_trait]
    impl Mailer for BrokenMailer {
        async fn send(&self, _mail: OutgoingMail) -> Result<(), MailError> {
            Err(MailError("smtp unavailable".into()))
        }
    }

    fn state_with(mailer: Arc<dyn Mailer>, audit: Arc<RecordingAuditSink>) -> AppState {
        AppState::new(
            Arc::new(MemoryIdentityStore::new()),
            TokenService::new("verification-secret", TokenPolicy::default()),
        )
        .with_mailer(mailer)
        .with_audit(audit)
    }

    fn request(email: &str) -> RegisterRequest {
        RegisterRequest {
            username: "alice".into(),
            email: email.into(),
            password: "password123".into(),
        }
    }

    #[actix_rt::test]
    async fn test_register_leaves_identity_pending() {
        let outbox = Arc::new(Outbox::default());
        let state = state_with(outbox.clone(), Arc::new(RecordingAuditSink::new()));

        let before = Utc::now();
        let identity = register(&state, &request("Alice@Example.com ")).await.unwrap();

        assert_eq!(identity.email, "alice@example.com");
        assert!(!identity.is_verified);
        let token = identity.verification_token.clone().unwrap();
        assert_eq!(token.len(), VERIFICATION_TOKEN_BYTES * 2);
        let expires_at = identity.verification_token_expires_at.unwrap();
        assert!(expires_at >= before + verification_ttl());
        assert!(expires_at <= Utc::now() + verification_ttl());

        let sent = outbox.0.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].html.contains(&token));
    }

    #[actix_rt::test]
    async fn test_register_rejects_duplicate_email() {
        let state = state_with(Arc::new(Outbox::default()), Arc::new(RecordingAuditSink::new()));
        register(&state, &request("dup@example.com")).await.unwrap();

        let result = register(&state, &request("DUP@example.com")).await;
        assert!(matches!(result, Err(AppError::DuplicateEmail)));
    }

    #[actix_rt::test]
    async fn test_register_propagates_mail_failure() {
        let state = state_with(Arc::new(BrokenMailer), Arc::new(RecordingAuditSink::new()));
        let result = register(&state, &request("nomail@example.com")).await;
        assert!(matches!(result, Err(AppError::MailDeliveryFailed(_))));
    }

    #[actix_rt::test]
    async fn test_complete_verification_is_single_use() {
        let audit = Arc::new(RecordingAuditSink::new());
        let state = state_with(Arc::new(Outbox::default()), audit.clone());
        let identity = register(&state, &request("once@example.com")).await.unwrap();
        let token = identity.verification_token.clone().unwrap();

        let verified = complete_verification(&state, &token, Utc::now()).await.unwrap();
        assert!(verified.is_verified);
        assert!(verified.verification_token.is_none());
        assert!(verified.verification_token_expires_at.is_none());

        let again = complete_verification(&state, &token, Utc::now()).await;
        assert!(matches!(again, Err(AppError::InvalidOrExpiredToken)));
        assert!(audit.contains(&AuthEvent::VerificationRejected {
            reason: VerificationFailure::UnknownToken
        }));
    }

    #[actix_rt::test]
    async fn test_expired_token_is_rejected_and_audited() {
        let audit = Arc::new(RecordingAuditSink::new());
        let state = state_with(Arc::new(Outbox::default()), audit.clone());
        let identity = register(&state, &request("late@example.com")).await.unwrap();
        let token = identity.verification_token.clone().unwrap();
        let expiry = identity.verification_token_expires_at.unwrap();

        let result = complete_verification(&state, &token, expiry).await;
        assert!(matches!(result, Err(AppError::InvalidOrExpiredToken)));
        assert!(audit.contains(&AuthEvent::VerificationRejected {
            reason: VerificationFailure::Expired
        }));

        let stored = state.store.find_by_id(identity.id).await.unwrap().unwrap();
        assert!(!stored.is_verified);
    }

    #[actix_rt::test]
    async fn test_resend_invalidates_previous_token() {
        let state = state_with(Arc::new(Outbox::default()), Arc::new(RecordingAuditSink::new()));
        let identity = register(&state, &request("again@example.com")).await.unwrap();
        let old_token = identity.verification_token.clone().unwrap();

        let (_, new_token) = resend(state.store.as_ref(), "again@example.com", Utc::now())
            .await
            .unwrap();
        assert_ne!(old_token, new_token);

        let old = complete_verification(&state, &old_token, Utc::now()).await;
        assert!(matches!(old, Err(AppError::InvalidOrExpiredToken)));
        assert!(complete_verification(&state, &new_token, Utc::now()).await.is_ok());
    }

    #[actix_rt::test]
    async fn test_resend_rejections() {
        let state = state_with(Arc::new(Outbox::default()), Arc::new(RecordingAuditSink::new()));
        let missing = resend(state.store.as_ref(), "ghost@example.com", Utc::now()).await;
        assert!(matches!(missing, Err(AppError::AccountNotFound)));

        let identity = register(&state, &request("done@example.com")).await.unwrap();
        let token = identity.verification_token.unwrap();
        complete_verification(&state, &token, Utc::now()).await.unwrap();

        let verified = resend(state.store.as_ref(), "done@example.com", Utc::now()).await;
        assert!(matches!(verified, Err(AppError::AlreadyVerified)));
    }
}
