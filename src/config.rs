use std::env;

use chrono::Duration;
use thiserror::Error;

use crate::auth::token::TokenPolicy;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Google OAuth client registration.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Absent selects the in-memory identity store.
    pub database_url: Option<String>,
    pub server_port: u16,
    pub server_host: String,
    pub jwt_secret: String,
    /// Public URL of this backend.
    pub backend_url: String,
    /// Client application URL used for verification links and OAuth redirects.
    pub app_base_url: String,
    pub google: Option<GoogleConfig>,
    pub token_policy: TokenPolicy,
    pub require_verified_login: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let jwt_secret = non_empty("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let server_host = non_empty("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let server_port = parse_or(non_empty("SERVER_PORT"), "SERVER_PORT", 8080u16)?;
        let backend_url = non_empty("BACKEND_URL")
            .unwrap_or_else(|| format!("http://{}:{}", server_host, server_port));
        let app_base_url =
            non_empty("APP_BASE_URL").unwrap_or_else(|| "http://localhost:3000".to_string());

        let google = match (non_empty("GOOGLE_CLIENT_ID"), non_empty("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GoogleConfig {
                client_id,
                client_secret,
                callback_url: non_empty("GOOGLE_CALLBACK_URL").unwrap_or_else(|| {
                    format!("{}/users/google/callback", backend_url.trim_end_matches('/'))
                }),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("GOOGLE_CLIENT_SECRET")),
            (None, Some(_)) => return Err(ConfigError::Missing("GOOGLE_CLIENT_ID")),
        };

        let defaults = TokenPolicy::default();
        let access_ttl = ttl_or(
            non_empty("ACCESS_TOKEN_TTL_SECS"),
            "ACCESS_TOKEN_TTL_SECS",
            defaults.access_ttl,
        )?;
        let refresh_ttl = ttl_or(
            non_empty("REFRESH_TOKEN_TTL_SECS"),
            "REFRESH_TOKEN_TTL_SECS",
            defaults.refresh_ttl,
        )?;

        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            server_port,
            server_host,
            jwt_secret,
            backend_url,
            app_base_url,
            google,
            token_policy: TokenPolicy {
                access_ttl,
                refresh_ttl,
            },
            require_verified_login: parse_or(
                non_empty("REQUIRE_VERIFIED_LOGIN"),
                "REQUIRE_VERIFIED_LOGIN",
                false,
            )?,
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

/// Longest accepted token lifetime, in seconds (ten years).
pub const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// A positive lifetime in whole seconds, at most `MAX_TTL_SECS`.
fn ttl_or(
    raw: Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(value) = raw else {
        return Ok(default);
    };
    value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|secs| (1..=MAX_TTL_SECS).contains(secs))
        .and_then(Duration::try_seconds)
        .ok_or(ConfigError::Invalid { key, value })
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
