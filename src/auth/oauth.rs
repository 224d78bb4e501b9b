//! Federated sign-in.
//!
//! Each external provider implements `IdentityProvider`; the set available to a
//! running server is fixed at startup in a `ProviderRegistry`. Providers only
//! turn an authorization code into a `ProviderAssertion`. Mapping that assertion
//! onto a local identity is `resolve`, shared by all of them. Nothing here
//! issues tokens.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use crate::config::GoogleConfig;
use crate::error::AppError;
use crate::models::Identity;
use crate::store::IdentityStore;

/// What a provider vouches for about the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAssertion {
    /// Stable subject identifier at the provider.
    pub subject: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Registry key and path segment, e.g. `google`.
    fn name(&self) -> &'static str;

    /// Where to send the browser to start the handshake.
    fn authorization_url(&self, state: &str) -> Result<String, AppError>;

    /// Redeems an authorization code for the user's assertion.
    async fn exchange(&self, code: &str) -> Result<ProviderAssertion, AppError>;
}

/// Providers keyed by name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    pub fn register(&mut self, provider: Arc<dyn IdentityProvider>) {
        self.providers.insert(provider.name(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn IdentityProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.providers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// The local identity behind an assertion, and whether it was just created.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub identity: Identity,
    pub created: bool,
}

/// Finds the identity linked to `(provider, assertion.subject)`, creating it on first sight.
///
/// Identities are never merged by email: if the asserted email already belongs
/// to another identity, creation fails with `DuplicateEmail`.
pub async fn resolve(
    store: &dyn IdentityStore,
    provider: &str,
    assertion: ProviderAssertion,
) -> Result<Resolution, AppError> {
    if let Some(identity) = store
        .find_by_federated_id(provider, &assertion.subject)
        .await?
    {
        return Ok(Resolution {
            identity,
            created: false,
        });
    }

    let email = assertion
        .email
        .as_deref()
        .map(super::normalize_email)
        .filter(|email| !email.is_empty())
        .ok_or_else(|| {
            AppError::UpstreamFederationFailure(format!("{} did not assert an email", provider))
        })?;
    let username = assertion
        .display_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
    let picture = assertion.picture.filter(|picture| !picture.is_empty());

    let subject = assertion.subject;
    let identity = match store
        .create(Identity::federated(
            provider,
            subject.clone(),
            username,
            email,
            picture,
        ))
        .await
    {
        Ok(identity) => identity,
        // A concurrent first login for the same subject may have won the insert.
        Err(AppError::DuplicateEmail) => {
            return match store.find_by_federated_id(provider, &subject).await? {
                Some(identity) => Ok(Resolution {
                    identity,
                    created: false,
                }),
                None => Err(AppError::DuplicateEmail),
            };
        }
        Err(error) => return Err(error),
    };
    Ok(Resolution {
        identity,
        created: true,
    })
}

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    name: Option<String>,
    email: Option<String>,
    picture: Option<String>,
}

/// Google OAuth2 / OpenID Connect, requesting the `profile` and `email` scopes.
#[derive(Debug, Clone)]
pub struct GoogleProvider {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
    http: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(config: &GoogleConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.callback_url.clone(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Points the token and userinfo calls somewhere else.
    pub fn with_endpoints(mut self, token_url: String, userinfo_url: String) -> Self {
        self.token_url = token_url;
        self.userinfo_url = userinfo_url;
        self
    }

    fn upstream(step: &str, error: impl std::fmt::Display) -> AppError {
        AppError::UpstreamFederationFailure(format!("google {}: {}", step, error))
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn authorization_url(&self, state: &str) -> Result<String, AppError> {
        let url = Url::parse_with_params(
            &self.auth_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "openid profile email"),
                ("state", state),
            ],
        )
        .map_err(|e| AppError::InternalServerError(format!("bad google auth url: {}", e)))?;
        Ok(url.to_string())
    }

    async fn exchange(&self, code: &str) -> Result<ProviderAssertion, AppError> {
        let token: GoogleTokenResponse = self
            .http
            .post(&self.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| Self::upstream("token request", e))?
            .error_for_status()
            .map_err(|e| Self::upstream("token request", e))?
            .json()
            .await
            .map_err(|e| Self::upstream("token response", e))?;

        let profile: GoogleUserInfo = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| Self::upstream("userinfo request", e))?
            .error_for_status()
            .map_err(|e| Self::upstream("userinfo request", e))?
            .json()
            .await
            .map_err(|e| Self::upstream("userinfo response", e))?;

        Ok(ProviderAssertion {
            subject: profile.sub,
            display_name: profile.name,
            email: profile.email,
            picture: profile.picture,
        })
    }
}
