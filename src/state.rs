use std::sync::Arc;

use crate::auth::audit::{AuditSink, LogAuditSink};
use crate::auth::oauth::{IdentityProvider, ProviderRegistry};
use crate::auth::token::TokenService;
use crate::mail::{LogMailer, Mailer};
use crate::store::IdentityStore;

/// Behaviour switches for the identity flows.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Client application URL for verification links and OAuth redirects.
    pub app_base_url: String,
    /// Refuse password login until the email is verified.
    pub require_verified_login: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            app_base_url: "http://localhost:3000".to_string(),
            require_verified_login: false,
        }
    }
}

/// Collaborators shared by every request, registered once as `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IdentityStore>,
    pub mailer: Arc<dyn Mailer>,
    pub tokens: TokenService,
    pub providers: ProviderRegistry,
    pub audit: Arc<dyn AuditSink>,
    pub settings: AuthSettings,
}

impl AppState {
    /// Logging mailer and audit sink, no federation providers, default settings.
    pub fn new(store: Arc<dyn IdentityStore>, tokens: TokenService) -> Self {
        Self {
            store,
            mailer: Arc::new(LogMailer),
            tokens,
            providers: ProviderRegistry::default(),
            audit: Arc::new(LogAuditSink),
            settings: AuthSettings::default(),
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.register(provider);
        self
    }

    pub fn with_settings(mut self, settings: AuthSettings) -> Self {
        self.settings = settings;
        self
    }
}
