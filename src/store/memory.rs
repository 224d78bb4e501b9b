//! In-memory identity store, used when no database is configured and in tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::IdentityStore;
use crate::error::AppError;
use crate::models::Identity;

#[derive(Clone, Default)]
pub struct MemoryIdentityStore {
    identities: Arc<RwLock<HashMap<Uuid, Identity>>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn find_first<P>(&self, predicate: P) -> Option<Identity>
    where
        P: Fn(&Identity) -> bool,
    {
        let identities = self.identities.read().await;
        identities.values().find(|identity| predicate(*identity)).cloned()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, AppError> {
        Ok(self.identities.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AppError> {
        Ok(self.find_first(|identity| identity.email == email).await)
    }

    async fn find_by_federated_id(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<Identity>, AppError> {
        Ok(self
            .find_first(|identity| {
                identity.federated_provider.as_deref() == Some(provider)
                    && identity.federated_id.as_deref() == Some(subject)
            })
            .await)
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<Identity>, AppError> {
        Ok(self
            .find_first(|identity| identity.verification_token.as_deref() == Some(token))
            .await)
    }

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<Identity>, AppError> {
        Ok(self
            .find_first(|identity| identity.refresh_token.as_deref() == Some(token))
            .await)
    }

    async fn create(&self, identity: Identity) -> Result<Identity, AppError> {
        let mut identities = self.identities.write().await;
        let taken = identities.values().any(|existing| {
            existing.email == identity.email
                || (identity.federated_id.is_some()
                    && existing.federated_provider == identity.federated_provider
                    && existing.federated_id == identity.federated_id)
        });
        if taken {
            return Err(AppError::DuplicateEmail);
        }
        identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn save(&self, identity: &Identity) -> Result<(), AppError> {
        let mut identities = self.identities.write().await;
        let stored = identities
            .get_mut(&identity.id)
            .ok_or_else(|| AppError::DatabaseError(format!("identity {} not found", identity.id)))?;
        let refresh_token = stored.refresh_token.take();
        *stored = Identity {
            refresh_token,
            updated_at: Utc::now(),
            ..identity.clone()
        };
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: Option<&str>,
        replacement: Option<&str>,
    ) -> Result<bool, AppError> {
        let mut identities = self.identities.write().await;
        match identities.get_mut(&id) {
            Some(stored) if stored.refresh_token.as_deref() == expected => {
                stored.refresh_token = replacement.map(str::to_string);
                stored.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
