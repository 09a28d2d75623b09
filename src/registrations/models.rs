use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device platform as reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Web,
    #[default]
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Web => "web",
            Platform::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "web" => Ok(Platform::Web),
            "unknown" | "" => Ok(Platform::Unknown),
            other => Err(format!("unknown platform: {other:?}")),
        }
    }
}

/// A device token registered for an owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceRegistration {
    pub id: i64,
    pub owner_id: String,
    pub device_id: String,
    pub token: String,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_model: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to [`RegistrationStore::upsert`](super::RegistrationStore::upsert).
/// Absent metadata leaves stored values untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationInput {
    pub owner_id: String,
    pub device_id: String,
    pub token: String,
    pub platform: Option<Platform>,
    pub os_version: Option<String>,
    pub device_model: Option<String>,
}

impl RegistrationInput {
    pub fn new(
        owner_id: impl Into<String>,
        device_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            device_id: device_id.into(),
            token: token.into(),
            ..Default::default()
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Whether applying this input to `current` would change anything.
    pub(crate) fn differs_from(&self, current: &DeviceRegistration) -> bool {
        fn changed<T: PartialEq>(new: Option<&T>, old: Option<&T>) -> bool {
            new.is_some() && new != old
        }

        self.token != current.token
            || !current.active
            || changed(self.platform.as_ref(), Some(&current.platform))
            || changed(self.os_version.as_ref(), current.os_version.as_ref())
            || changed(self.device_model.as_ref(), current.device_model.as_ref())
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RegistrationRow {
    pub id: i64,
    pub owner_id: String,
    pub device_id: String,
    pub token: String,
    pub platform: String,
    pub os_version: Option<String>,
    pub device_model: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RegistrationRow> for DeviceRegistration {
    fn from(row: RegistrationRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            device_id: row.device_id,
            token: row.token,
            platform: row.platform.parse().unwrap_or_default(),
            os_version: row.os_version,
            device_model: row.device_model,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
