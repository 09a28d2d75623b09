//! The singleton push credential and the transport client built from it.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::credentials::models::{CredentialRow, PushCredential};
use crate::db::DbPool;
use crate::transport::{PushTransport, TransportFactory, TransportInitError};

pub mod models;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Push credential is not configured")]
    NotConfigured,
    #[error("Invalid credential JSON: {0}")]
    InvalidFormat(#[source] serde_json::Error),
    #[error("Failed to initialize push transport: {0}")]
    TransportInit(#[from] TransportInitError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Owns the stored credential and lazily builds one shared transport
/// client from it.
pub struct CredentialHolder {
    pool: DbPool,
    factory: Arc<dyn TransportFactory>,
    transport: RwLock<Option<Arc<dyn PushTransport>>>,
}

impl CredentialHolder {
    pub fn new(pool: DbPool, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            pool,
            factory,
            transport: RwLock::new(None),
        }
    }

    pub async fn get(&self) -> Result<PushCredential, CredentialError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT payload, created_at, updated_at FROM push_credentials WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CredentialError::NotConfigured)?;

        PushCredential::try_from(row).map_err(CredentialError::InvalidFormat)
    }

    /// Stores `raw` as the credential, replacing any previous one. Returns the
    /// stored credential and whether none existed before.
    ///
    /// The cached transport is dropped so the next send is made with the new
    /// credential.
    pub async fn put(&self, raw: &str) -> Result<(PushCredential, bool), CredentialError> {
        serde_json::from_str::<serde_json::Value>(raw).map_err(CredentialError::InvalidFormat)?;

        // Held until the new payload is committed and the cache is cleared.
        let mut transport = self.transport.write().await;

        let mut tx = self.pool.begin().await?;

        let existed: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM push_credentials WHERE id = 1)")
                .fetch_one(&mut *tx)
                .await?;

        let now = Utc::now();
        let row = sqlx::query_as::<_, CredentialRow>(
            "INSERT INTO push_credentials (id, payload, created_at, updated_at)
             VALUES (1, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
             RETURNING payload, created_at, updated_at",
        )
        .bind(raw)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        *transport = None;

        let credential = PushCredential::try_from(row).map_err(CredentialError::InvalidFormat)?;
        tracing::info!(
            project_id = credential.project_id().unwrap_or("-"),
            created = !existed,
            "Push credential stored"
        );

        Ok((credential, !existed))
    }

    /// Builds the transport client unless one is already cached.
    pub async fn initialize_transport(&self) -> Result<(), CredentialError> {
        self.transport().await.map(|_| ())
    }

    /// The shared transport client, built on first use.
    pub async fn transport(&self) -> Result<Arc<dyn PushTransport>, CredentialError> {
        {
            let cached = self.transport.read().await;
            if let Some(transport) = cached.as_ref() {
                return Ok(Arc::clone(transport));
            }
        }

        let mut slot = self.transport.write().await;
        if let Some(transport) = slot.as_ref() {
            return Ok(Arc::clone(transport));
        }

        let credential = self.get().await?;
        let transport = self.factory.build(&credential).map_err(|e| {
            tracing::error!(error = %e, "Push transport initialization failed");
            e
        })?;
        tracing::info!(project_id = credential.project_id().unwrap_or("-"), "Push transport initialized");

        *slot = Some(Arc::clone(&transport));
        Ok(transport)
    }
}
