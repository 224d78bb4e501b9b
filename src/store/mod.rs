//! Identity persistence.
//!
//! The store is the only state shared between requests. Every method is atomic at
//! the single-record level; nothing here spans records or steps.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Identity;

pub use memory::MemoryIdentityStore;
pub use postgres::PgIdentityStore;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Short backend name reported by the health endpoint.
    fn backend(&self) -> &'static str;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, AppError>;

    /// `email` is expected to be normalized already.
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AppError>;

    async fn find_by_federated_id(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<Identity>, AppError>;

    /// Matches the stored pending token only; expiry is the caller's concern.
    async fn find_by_verification_token(&self, token: &str) -> Result<Option<Identity>, AppError>;

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<Identity>, AppError>;

    /// Inserts a new identity.
    ///
    /// Fails with `AppError::DuplicateEmail` when the email, or the federated
    /// `(provider, subject)` pair, is already taken.
    async fn create(&self, identity: Identity) -> Result<Identity, AppError>;

    /// Writes every mutable field except `refresh_token`.
    async fn save(&self, identity: &Identity) -> Result<(), AppError>;

    /// Compare-and-set on the refresh slot.
    ///
    /// Replaces the stored refresh token with `replacement` only if it currently
    /// equals `expected` (`None` meaning "no token"). Returns `false` when the
    /// stored value had already moved on, or the identity does not exist.
    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: Option<&str>,
        replacement: Option<&str>,
    ) -> Result<bool, AppError>;
}
