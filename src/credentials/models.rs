use chrono::{DateTime, Utc};
use serde::Serialize;

/// The stored push credential. `payload` is the uploaded JSON document,
/// normally a Google service-account key; `raw` is its text exactly as
/// uploaded.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PushCredential {
    pub payload: serde_json::Value,
    #[serde(skip)]
    pub raw: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PushCredential {
    pub fn project_id(&self) -> Option<&str> {
        self.payload.get("project_id").and_then(serde_json::Value::as_str)
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CredentialRow {
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CredentialRow> for PushCredential {
    type Error = serde_json::Error;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        Ok(Self {
            payload: serde_json::from_str(&row.payload)?,
            raw: row.payload,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
