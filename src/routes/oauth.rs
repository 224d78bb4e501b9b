//! Browser redirect flow for federated sign-in.
//!
//! `/auth/{provider}` sends the browser to the provider with a random `state`
//! remembered in a short-lived cookie. `/{provider}/callback` checks that state,
//! redeems the code and sends the browser back to the client application with
//! either `?token=` or `?error=`.

use actix_web::{
    cookie::{time::Duration as CookieDuration, Cookie, SameSite},
    get,
    http::header,
    web, HttpRequest, HttpResponse,
};
use reqwest::Url;
use serde::Deserialize;

use crate::auth::audit::AuthEvent;
use crate::auth::oauth::{self, IdentityProvider};
use crate::auth::random_token;
use crate::error::AppError;
use crate::state::AppState;

pub const STATE_COOKIE: &str = "oauth_state";
const STATE_BYTES: usize = 16;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Why a callback did not end in a token.
#[derive(Debug)]
enum CallbackFailure {
    Denied(String),
    InvalidState,
    MissingCode,
    Failed(AppError),
}

impl CallbackFailure {
    /// Value placed in the client's `?error=` parameter.
    fn code(&self) -> &'static str {
        match self {
            CallbackFailure::Denied(_) => "access_denied",
            CallbackFailure::InvalidState => "invalid_state",
            CallbackFailure::MissingCode => "missing_code",
            CallbackFailure::Failed(AppError::DuplicateEmail) => "email_in_use",
            CallbackFailure::Failed(AppError::UpstreamFederationFailure(_)) => "federation_failed",
            CallbackFailure::Failed(_) => "server_error",
        }
    }

    fn reason(&self) -> String {
        match self {
            CallbackFailure::Denied(error) => format!("provider returned {}", error),
            CallbackFailure::Failed(error) => error.to_string(),
            other => other.code().to_string(),
        }
    }
}

fn lookup_provider(
    state: &AppState,
    name: &str,
) -> Result<std::sync::Arc<dyn IdentityProvider>, AppError> {
    state
        .providers
        .get(name)
        .ok_or_else(|| AppError::NotFound(format!("Unknown identity provider: {}", name)))
}

/// `{app_base_url}/auth/callback?{key}={value}`
fn client_redirect(app_base_url: &str, key: &str, value: &str) -> Result<String, AppError> {
    let base = format!("{}/auth/callback", app_base_url.trim_end_matches('/'));
    Url::parse_with_params(&base, &[(key, value)])
        .map(|url| url.to_string())
        .map_err(|e| AppError::InternalServerError(format!("bad APP_BASE_URL: {}", e)))
}

fn found(location: String, cookie: Cookie<'static>) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .cookie(cookie)
        .finish()
}

/// Start the provider handshake.
#[get("/auth/{provider}")]
pub async fn start(
    state: web::Data<AppState>,
    provider: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let provider = lookup_provider(&state, &provider)?;
    let csrf_state = random_token(STATE_BYTES);
    let location = provider.authorization_url(&csrf_state)?;

    let cookie = Cookie::build(STATE_COOKIE, csrf_state)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::minutes(10))
        .finish();
    Ok(found(location, cookie))
}

/// Provider callback: verify state, redeem the code, resolve, issue an access token.
#[get("/{provider}/callback")]
pub async fn callback(
    state: web::Data<AppState>,
    provider: web::Path<String>,
    query: web::Query<CallbackQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let provider = lookup_provider(&state, &provider)?;
    let expected_state = req.cookie(STATE_COOKIE).map(|c| c.value().to_string());

    let location = match complete(&state, provider.as_ref(), &query, expected_state.as_deref()).await
    {
        Ok(token) => client_redirect(&state.settings.app_base_url, "token", &token)?,
        Err(failure) => {
            if let CallbackFailure::Failed(error) = &failure {
                if !matches!(
                    error,
                    AppError::DuplicateEmail | AppError::UpstreamFederationFailure(_)
                ) {
                    log::error!("federated login via {} failed: {}", provider.name(), error);
                }
            }
            state.audit.record(AuthEvent::FederationRejected {
                provider: provider.name().to_string(),
                reason: failure.reason(),
            });
            client_redirect(&state.settings.app_base_url, "error", failure.code())?
        }
    };

    let mut clear_state = Cookie::build(STATE_COOKIE, "").path("/").finish();
    clear_state.make_removal();
    Ok(found(location, clear_state))
}

async fn complete(
    state: &AppState,
    provider: &dyn IdentityProvider,
    query: &CallbackQuery,
    expected_state: Option<&str>,
) -> Result<String, CallbackFailure> {
    if let Some(error) = &query.error {
        return Err(CallbackFailure::Denied(error.clone()));
    }
    match (query.state.as_deref(), expected_state) {
        (Some(presented), Some(expected)) if !presented.is_empty() && presented == expected => {}
        _ => return Err(CallbackFailure::InvalidState),
    }
    let code = query
        .code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or(CallbackFailure::MissingCode)?;

    let assertion = provider
        .exchange(code)
        .await
        .map_err(CallbackFailure::Failed)?;
    let resolution = oauth::resolve(state.store.as_ref(), provider.name(), assertion)
        .await
        .map_err(CallbackFailure::Failed)?;
    state.audit.record(AuthEvent::FederatedLogin {
        provider: provider.name().to_string(),
        identity_id: resolution.identity.id,
        created: resolution.created,
    });

    state
        .tokens
        .issue_default_access(resolution.identity.id)
        .map_err(CallbackFailure::Failed)
}
