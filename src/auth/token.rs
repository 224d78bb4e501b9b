use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// What a signed token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Represents the claims encoded within every token this service signs.
///
/// All issuance paths (login, email verification, federation, refresh) share
/// this one shape.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Identity the token was issued to.
    pub sub: Uuid,
    pub kind: TokenKind,
    /// Unique per token, so two tokens minted in the same second still differ.
    pub jti: Uuid,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
}

/// Token lifetimes, applied uniformly to every issuance path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::hours(7),
            refresh_ttl: Duration::days(7),
        }
    }
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs and verifies HS256 tokens against a single shared secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    policy: TokenPolicy,
}

impl TokenService {
    pub fn new(secret: &str, policy: TokenPolicy) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            policy,
        }
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    /// Signs both tokens. The caller persists `refresh_token` onto the identity.
    pub fn issue_pair(&self, identity_id: Uuid) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.issue_access(identity_id, self.policy.access_ttl)?,
            refresh_token: self.sign(identity_id, TokenKind::Refresh, self.policy.refresh_ttl)?,
        })
    }

    pub fn issue_access(&self, identity_id: Uuid, ttl: Duration) -> Result<String, AppError> {
        self.sign(identity_id, TokenKind::Access, ttl)
    }

    /// Access token with the policy's lifetime.
    pub fn issue_default_access(&self, identity_id: Uuid) -> Result<String, AppError> {
        self.issue_access(identity_id, self.policy.access_ttl)
    }

    fn sign(&self, identity_id: Uuid, kind: TokenKind, ttl: Duration) -> Result<String, AppError> {
        let now = Utc::now();
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            AppError::InternalServerError(format!("token lifetime out of range: {}", ttl))
        })?;
        let claims = Claims {
            sub: identity_id,
            kind,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::InternalServerError(format!("Failed to sign token: {}", e)))
    }

    /// Checks signature and expiry.
    ///
    /// Every failure collapses to `AppError::InvalidToken`, carrying the
    /// underlying reason for diagnostics.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::InvalidToken(format!("{:?}", e.kind())))
    }

    /// `verify`, additionally requiring the token to be of `kind`.
    pub fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, AppError> {
        let claims = self.verify(token)?;
        if claims.kind != kind {
            return Err(AppError::InvalidToken(format!(
                "WrongTokenKind({:?})",
                claims.kind
            )));
        }
        Ok(claims)
    }
}
