//! Postgres-backed identity store.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::IdentityStore;
use crate::error::AppError;
use crate::models::Identity;

const IDENTITY_COLUMNS: &str = "id, username, email, password_hash, federated_provider, federated_id, \
     profile_image, is_verified, verification_token, verification_token_expires_at, \
     refresh_token, created_at, updated_at";

/// Postgres error code for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and applies the embedded migrations.
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("migration failed: {}", e)))?;
        Ok(Self::new(pool))
    }

    async fn find_where(&self, condition: &str, value: &str) -> Result<Option<Identity>, AppError> {
        let sql = format!(
            "SELECT {} FROM identities WHERE {} = $1",
            IDENTITY_COLUMNS, condition
        );
        let identity = sqlx::query_as::<_, Identity>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(identity)
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, AppError> {
        let sql = format!("SELECT {} FROM identities WHERE id = $1", IDENTITY_COLUMNS);
        let identity = sqlx::query_as::<_, Identity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(identity)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AppError> {
        self.find_where("email", email).await
    }

    async fn find_by_federated_id(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<Identity>, AppError> {
        let sql = format!(
            "SELECT {} FROM identities WHERE federated_provider = $1 AND federated_id = $2",
            IDENTITY_COLUMNS
        );
        let identity = sqlx::query_as::<_, Identity>(&sql)
            .bind(provider)
            .bind(subject)
            .fetch_optional(&self.pool)
            .await?;
        Ok(identity)
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<Identity>, AppError> {
        self.find_where("verification_token", token).await
    }

    async fn find_by_refresh_token(&self, token: &str) -> Result<Option<Identity>, AppError> {
        self.find_where("refresh_token", token).await
    }

    async fn create(&self, identity: Identity) -> Result<Identity, AppError> {
        let sql = format!(
            "INSERT INTO identities ({cols}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {cols}",
            cols = IDENTITY_COLUMNS
        );
        sqlx::query_as::<_, Identity>(&sql)
            .bind(identity.id)
            .bind(&identity.username)
            .bind(&identity.email)
            .bind(&identity.password_hash)
            .bind(&identity.federated_provider)
            .bind(&identity.federated_id)
            .bind(&identity.profile_image)
            .bind(identity.is_verified)
            .bind(&identity.verification_token)
            .bind(identity.verification_token_expires_at)
            .bind(&identity.refresh_token)
            .bind(identity.created_at)
            .bind(identity.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| match &error {
                sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                    AppError::DuplicateEmail
                }
                _ => AppError::from(error),
            })
    }

    async fn save(&self, identity: &Identity) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE identities
             SET username = $1, email = $2, password_hash = $3, federated_provider = $4,
                 federated_id = $5, profile_image = $6, is_verified = $7,
                 verification_token = $8, verification_token_expires_at = $9, updated_at = now()
             WHERE id = $10",
        )
        .bind(&identity.username)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(&identity.federated_provider)
        .bind(&identity.federated_id)
        .bind(&identity.profile_image)
        .bind(identity.is_verified)
        .bind(&identity.verification_token)
        .bind(identity.verification_token_expires_at)
        .bind(identity.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::DatabaseError(format!(
                "identity {} not found",
                identity.id
            )));
        }
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: Option<&str>,
        replacement: Option<&str>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE identities SET refresh_token = $1, updated_at = now()
             WHERE id = $2 AND refresh_token IS NOT DISTINCT FROM $3",
        )
        .bind(replacement)
        .bind(id)
        .bind(expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
