use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// An account record: credentials, verification state and linked provider.
///
/// `refresh_token` is the single live refresh credential. It is only ever changed
/// through `IdentityStore::swap_refresh_token`, never through `save`.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Present only for accounts with a local password.
    pub password_hash: Option<String>,
    /// Name of the provider that owns `federated_id`.
    pub federated_provider: Option<String>,
    /// Subject identifier asserted by the provider.
    pub federated_id: Option<String>,
    pub profile_image: Option<String>,
    pub is_verified: bool,
    pub verification_token: Option<String>,
    pub verification_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// A new, unverified, password-backed account.
    pub fn with_password(username: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            email,
            password_hash: Some(password_hash),
            federated_provider: None,
            federated_id: None,
            profile_image: None,
            is_verified: false,
            verification_token: None,
            verification_token_expires_at: None,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A new account originating from a provider assertion. It has no password.
    pub fn federated(
        provider: &str,
        subject: String,
        username: String,
        email: String,
        profile_image: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            email,
            password_hash: None,
            federated_provider: Some(provider.to_string()),
            federated_id: Some(subject),
            profile_image,
            is_verified: false,
            verification_token: None,
            verification_token_expires_at: None,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_pending_verification(&mut self, token: String, expires_at: DateTime<Utc>) {
        self.verification_token = Some(token);
        self.verification_token_expires_at = Some(expires_at);
        self.updated_at = Utc::now();
    }

    /// Flips the account to verified and clears both pending fields.
    pub fn mark_verified(&mut self) {
        self.is_verified = true;
        self.verification_token = None;
        self.verification_token_expires_at = None;
        self.updated_at = Utc::now();
    }

    /// True when a pending token exists and `now` is strictly before its expiry.
    pub fn verification_pending_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.verification_token, self.verification_token_expires_at) {
            (Some(_), Some(expires_at)) => now < expires_at,
            _ => false,
        }
    }

    pub fn view(&self) -> IdentityView {
        IdentityView::from(self)
    }
}

/// What an identity looks like to API clients. Never includes hashes or tokens.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub profile_image: Option<String>,
    pub is_verified: bool,
    pub federated_provider: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Identity> for IdentityView {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            profile_image: identity.profile_image.clone(),
            is_verified: identity.is_verified,
            federated_provider: identity.federated_provider.clone(),
            created_at: identity.created_at,
            updated_at: identity.updated_at,
        }
    }
}
