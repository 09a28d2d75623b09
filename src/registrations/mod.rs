//! Device registrations: which tokens belong to which owner.
//!
//! One registration per (owner, device) and every token bound to at most one
//! registration; both are enforced by UNIQUE constraints, so a conflicting
//! write fails instead of silently moving a token between owners.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use thiserror::Error;

use crate::core::token_fingerprint;
use crate::db::DbPool;
use crate::registrations::models::{DeviceRegistration, RegistrationInput, RegistrationRow};

pub mod models;

const REGISTRATION_COLUMNS: &str = "id, owner_id, device_id, token, platform, os_version, \
    device_model, active, created_at, updated_at";

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("No registration for owner {owner_id:?} and device {device_id:?}")]
    NotFound { owner_id: String, device_id: String },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct RegistrationStore {
    pool: DbPool,
}

fn require(field: &str, value: &str) -> Result<(), RegistrationError> {
    if value.trim().is_empty() {
        return Err(RegistrationError::InvalidInput(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

/// Turns UNIQUE violations into [`RegistrationError::ConstraintViolation`].
fn map_write_error(err: sqlx::Error) -> RegistrationError {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            let reason = if db_err.message().contains("device_registrations.token") {
                "token is already registered to another device"
            } else {
                "a registration for this owner and device already exists"
            };
            RegistrationError::ConstraintViolation(reason.to_string())
        }
        other => RegistrationError::Database(other),
    }
}

impl RegistrationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Creates the registration for (owner, device) or updates it in place.
    /// Returns the stored row and whether it was newly created.
    pub async fn upsert(
        &self,
        input: &RegistrationInput,
    ) -> Result<(DeviceRegistration, bool), RegistrationError> {
        require("owner_id", &input.owner_id)?;
        require("device_id", &input.device_id)?;
        require("token", &input.token)?;

        // Takes the write lock up front so concurrent upserts of the same
        // (owner, device) serialize instead of racing to INSERT.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let query = format!(
            "SELECT {REGISTRATION_COLUMNS} FROM device_registrations
             WHERE owner_id = ? AND device_id = ?"
        );
        let existing = sqlx::query_as::<_, RegistrationRow>(&query)
            .bind(&input.owner_id)
            .bind(&input.device_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(DeviceRegistration::from);

        let now = Utc::now();
        let (registration, created) = match existing {
            None => {
                let query = format!(
                    "INSERT INTO device_registrations
                        (owner_id, device_id, token, platform, os_version, device_model,
                         active, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
                     RETURNING {REGISTRATION_COLUMNS}"
                );
                let row = sqlx::query_as::<_, RegistrationRow>(&query)
                    .bind(&input.owner_id)
                    .bind(&input.device_id)
                    .bind(&input.token)
                    .bind(input.platform.unwrap_or_default().as_str())
                    .bind(&input.os_version)
                    .bind(&input.device_model)
                    .bind(now)
                    .bind(now)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_write_error)?;
                (DeviceRegistration::from(row), true)
            }
            Some(current) if input.differs_from(&current) => {
                let query = format!(
                    "UPDATE device_registrations
                     SET token = ?,
                         platform = COALESCE(?, platform),
                         os_version = COALESCE(?, os_version),
                         device_model = COALESCE(?, device_model),
                         active = 1,
                         updated_at = ?
                     WHERE id = ?
                     RETURNING {REGISTRATION_COLUMNS}"
                );
                let row = sqlx::query_as::<_, RegistrationRow>(&query)
                    .bind(&input.token)
                    .bind(input.platform.map(|p| p.as_str()))
                    .bind(&input.os_version)
                    .bind(&input.device_model)
                    .bind(now)
                    .bind(current.id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_write_error)?;
                (DeviceRegistration::from(row), false)
            }
            Some(current) => (current, false),
        };

        tx.commit().await?;

        tracing::info!(
            owner_id = %registration.owner_id,
            device_id = %registration.device_id,
            token = %token_fingerprint(&registration.token),
            created,
            "Device registration saved"
        );

        Ok((registration, created))
    }

    /// All registrations, or those of one owner, ordered by id.
    pub async fn list(
        &self,
        owner_id: Option<&str>,
    ) -> Result<Vec<DeviceRegistration>, RegistrationError> {
        let rows = match owner_id {
            Some(owner_id) => {
                let query = format!(
                    "SELECT {REGISTRATION_COLUMNS} FROM device_registrations
                     WHERE owner_id = ? ORDER BY id"
                );
                sqlx::query_as::<_, RegistrationRow>(&query)
                    .bind(owner_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let query =
                    format!("SELECT {REGISTRATION_COLUMNS} FROM device_registrations ORDER BY id");
                sqlx::query_as::<_, RegistrationRow>(&query)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows.into_iter().map(DeviceRegistration::from).collect())
    }

    pub async fn remove(&self, owner_id: &str, device_id: &str) -> Result<(), RegistrationError> {
        require("owner_id", owner_id)?;
        require("device_id", device_id)?;

        let result =
            sqlx::query("DELETE FROM device_registrations WHERE owner_id = ? AND device_id = ?")
                .bind(owner_id)
                .bind(device_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RegistrationError::NotFound {
                owner_id: owner_id.to_string(),
                device_id: device_id.to_string(),
            });
        }

        tracing::info!(%owner_id, %device_id, "Device registration removed");
        Ok(())
    }

    /// Marks the registration inactive; it stays listed but is no longer a
    /// recipient. A later upsert re-activates it.
    pub async fn deactivate(
        &self,
        owner_id: &str,
        device_id: &str,
    ) -> Result<DeviceRegistration, RegistrationError> {
        require("owner_id", owner_id)?;
        require("device_id", device_id)?;

        let query = format!(
            "UPDATE device_registrations SET active = 0, updated_at = ?
             WHERE owner_id = ? AND device_id = ?
             RETURNING {REGISTRATION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, RegistrationRow>(&query)
            .bind(Utc::now())
            .bind(owner_id)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RegistrationError::NotFound {
                owner_id: owner_id.to_string(),
                device_id: device_id.to_string(),
            })?;

        tracing::info!(%owner_id, %device_id, "Device registration deactivated");
        Ok(row.into())
    }

    /// Tokens of the active registrations of `owner_ids`, in registration
    /// order. Unknown owners contribute nothing.
    pub async fn resolve_tokens(&self, owner_ids: &[String]) -> Result<Vec<String>, RegistrationError> {
        if owner_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT token FROM device_registrations WHERE active = 1 AND owner_id IN (",
        );
        let mut owners = builder.separated(", ");
        for owner_id in owner_ids {
            owners.push_bind(owner_id.as_str());
        }
        owners.push_unseparated(") ORDER BY id");

        let tokens = builder
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await?;

        Ok(tokens)
    }
}
