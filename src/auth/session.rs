//! Password login and access-token refresh.
//!
//! Each identity holds at most one live refresh token. Login replaces it with a
//! compare-and-set against the value read at the start of the login, so two
//! racing logins cannot silently overwrite each other: the loser gets
//! `RefreshTokenConflict` and retries. Sequential logins always succeed, and
//! each one invalidates the refresh token handed out by the previous one.

use super::audit::{AuthEvent, RefreshFailure};
use super::normalize_email;
use super::password::matches_stored;
use super::token::{TokenKind, TokenPair};
use crate::error::AppError;
use crate::models::Identity;
use crate::state::AppState;

/// Authenticates an email/password pair and mints a token pair.
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<TokenPair, AppError> {
    let email = normalize_email(email);
    let candidate = state.store.find_by_email(&email).await?;
    let stored_hash = candidate
        .as_ref()
        .and_then(|identity| identity.password_hash.as_deref());
    let matched = matches_stored(password, stored_hash)?;
    let identity = match candidate {
        Some(identity) if matched => identity,
        _ => {
            state.audit.record(AuthEvent::LoginRejected { email });
            return Err(AppError::InvalidCredentials);
        }
    };

    if state.settings.require_verified_login && !identity.is_verified {
        return Err(AppError::EmailNotVerified);
    }

    let pair = state.tokens.issue_pair(identity.id)?;
    install_refresh_token(state, &identity, &pair.refresh_token).await?;
    state.audit.record(AuthEvent::LoginSucceeded {
        identity_id: identity.id,
    });
    Ok(pair)
}

/// Replaces the refresh token `identity` was read with by `refresh_token`.
pub async fn install_refresh_token(
    state: &AppState,
    identity: &Identity,
    refresh_token: &str,
) -> Result<(), AppError> {
    let swapped = state
        .store
        .swap_refresh_token(
            identity.id,
            identity.refresh_token.as_deref(),
            Some(refresh_token),
        )
        .await?;
    if !swapped {
        state.audit.record(AuthEvent::LoginConflict {
            identity_id: identity.id,
        });
        return Err(AppError::RefreshTokenConflict);
    }
    Ok(())
}

/// Exchanges the identity's current refresh token for a new access token.
///
/// The presented value must equal the stored one and independently verify as
/// an unexpired refresh token for that identity. The refresh token itself is
/// not rotated.
pub async fn refresh(state: &AppState, presented: &str) -> Result<String, AppError> {
    let reject = |reason| {
        state.audit.record(AuthEvent::RefreshRejected { reason });
        AppError::InvalidRefreshToken
    };

    let identity = match state.store.find_by_refresh_token(presented).await? {
        Some(identity) => identity,
        None => return Err(reject(RefreshFailure::NotCurrent)),
    };
    let claims = match state.tokens.verify_kind(presented, TokenKind::Refresh) {
        Ok(claims) => claims,
        Err(_) => return Err(reject(RefreshFailure::Unverifiable)),
    };
    if claims.sub != identity.id {
        return Err(reject(RefreshFailure::SubjectMismatch));
    }

    let access = state.tokens.issue_default_access(identity.id)?;
    state.audit.record(AuthEvent::AccessRefreshed {
        identity_id: identity.id,
    });
    Ok(access)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::audit::RecordingAuditSink;
    use crate::auth::password::hash_password;
    use crate::auth::token::{TokenPolicy, TokenService};
    use crate::state::AuthSettings;
    use crate::store::{IdentityStore, MemoryIdentityStore};
    use chrono::Duration;
    use std::sync::Arc;

    async fn state_with_account(email: &str, password: &str) -> (AppState, Arc<RecordingAuditSink>) {
        let store = Arc::new(MemoryIdentityStore::new());
        store
            .create(Identity::with_password(
                "user".into(),
                email.into(),
                hash_password(password).unwrap(),
            ))
            .await
            .unwrap();
        let audit = Arc::new(RecordingAuditSink::new());
        let state = AppState::new(
            store,
            TokenService::new("session-secret", TokenPolicy::default()),
        )
        .with_audit(audit.clone());
        (state, audit)
    }

    #[actix_rt::test]
    async fn test_login_issues_pair_and_persists_refresh() {
        let (state, _) = state_with_account("login@example.com", "password123").await;
        let pair = login(&state, "Login@Example.com", "password123").await.unwrap();

        let stored = state
            .store
            .find_by_email("login@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some(pair.refresh_token.as_str()));
        let claims = state.tokens.verify_kind(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, stored.id);
    }

    #[actix_rt::test]
    async fn test_login_rejects_bad_credentials() {
        let (state, _) = state_with_account("bad@example.com", "password123").await;
        assert!(matches!(
            login(&state, "bad@example.com", "wrong-password").await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            login(&state, "nobody@example.com", "password123").await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[actix_rt::test]
    async fn test_federated_only_account_cannot_password_login() {
        let (state, _) = state_with_account("other@example.com", "password123").await;
        state
            .store
            .create(Identity::federated(
                "google",
                "sub-1".into(),
                "Fed".into(),
                "fed@example.com".into(),
                None,
            ))
            .await
            .unwrap();
        assert!(matches!(
            login(&state, "fed@example.com", "").await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[actix_rt::test]
    async fn test_unverified_login_policy() {
        let (state, _) = state_with_account("unverified@example.com", "password123").await;
        assert!(login(&state, "unverified@example.com", "password123").await.is_ok());

        let strict = state.with_settings(AuthSettings {
            require_verified_login: true,
            ..AuthSettings::default()
        });
        assert!(matches!(
            login(&strict, "unverified@example.com", "password123").await,
            Err(AppError::EmailNotVerified)
        ));
    }

    #[actix_rt::test]
    async fn test_second_login_invalidates_first_refresh_token() {
        let (state, audit) = state_with_account("twice@example.com", "password123").await;
        let first = login(&state, "twice@example.com", "password123").await.unwrap();
        let second = login(&state, "twice@example.com", "password123").await.unwrap();

        assert!(matches!(
            refresh(&state, &first.refresh_token).await,
            Err(AppError::InvalidRefreshToken)
        ));
        assert!(audit.contains(&AuthEvent::RefreshRejected {
            reason: RefreshFailure::NotCurrent
        }));

        let access = refresh(&state, &second.refresh_token).await.unwrap();
        assert!(state.tokens.verify_kind(&access, TokenKind::Access).is_ok());
    }

    #[actix_rt::test]
    async fn test_stale_login_loses_the_race() {
        let (state, audit) = state_with_account("race@example.com", "password123").await;
        let snapshot = state
            .store
            .find_by_email("race@example.com")
            .await
            .unwrap()
            .unwrap();

        // Another login lands between our read and our write.
        login(&state, "race@example.com", "password123").await.unwrap();

        let pair = state.tokens.issue_pair(snapshot.id).unwrap();
        let result = install_refresh_token(&state, &snapshot, &pair.refresh_token).await;
        assert!(matches!(result, Err(AppError::RefreshTokenConflict)));
        assert!(audit.contains(&AuthEvent::LoginConflict {
            identity_id: snapshot.id
        }));
    }

    #[actix_rt::test]
    async fn test_refresh_rejects_expired_stored_token() {
        let (state, audit) = state_with_account("expired@example.com", "password123").await;
        let identity = state
            .store
            .find_by_email("expired@example.com")
            .await
            .unwrap()
            .unwrap();
        let short_lived = TokenService::new(
            "session-secret",
            TokenPolicy {
                access_ttl: Duration::hours(1),
                refresh_ttl: Duration::hours(-1),
            },
        );
        let stale = short_lived.issue_pair(identity.id).unwrap().refresh_token;
        install_refresh_token(&state, &identity, &stale).await.unwrap();

        assert!(matches!(
            refresh(&state, &stale).await,
            Err(AppError::InvalidRefreshToken)
        ));
        assert!(audit.contains(&AuthEvent::RefreshRejected {
            reason: RefreshFailure::Unverifiable
        }));
    }

    #[actix_rt::test]
    async fn test_access_token_is_not_a_refresh_token() {
        let (state, _) = state_with_account("kind@example.com", "password123").await;
        let identity = state
            .store
            .find_by_email("kind@example.com")
            .await
            .unwrap()
            .unwrap();
        let access = state.tokens.issue_default_access(identity.id).unwrap();
        install_refresh_token(&state, &identity, &access).await.unwrap();

        assert!(matches!(
            refresh(&state, &access).await,
            Err(AppError::InvalidRefreshToken)
        ));
    }
}
