use thiserror::Error;
use url::Url;

use crate::transport::FcmTransportFactory;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("{name} is not a valid URL: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    /// Replaces the `messages:send` URL derived from the credential.
    pub fcm_send_url: Option<Url>,
    /// Replaces the Instance ID base URL.
    pub fcm_iid_url: Option<Url>,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                          |
    /// |----------------------------|----------------------------------|
    /// | `HOST`                     | `0.0.0.0`                        |
    /// | `PORT`                     | `8000`                           |
    /// | `DATABASE_URL`             | `sqlite://fcm_relay.db?mode=rwc` |
    /// | `DATABASE_MAX_CONNECTIONS` | `5`                              |
    /// | `FCM_SEND_URL`             | derived from the credential      |
    /// | `FCM_IID_URL`              | `https://iid.googleapis.com`     |
    /// | `LOG_FORMAT`               | `pretty`                         |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".into());

        let port = match var("PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                name: "PORT",
                expected: "a port number",
                value,
            })?,
            None => 8000,
        };

        let database_url =
            var("DATABASE_URL").unwrap_or_else(|| "sqlite://fcm_relay.db?mode=rwc".into());

        let database_max_connections = match var("DATABASE_MAX_CONNECTIONS") {
            Some(value) => match value.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "DATABASE_MAX_CONNECTIONS",
                        expected: "a positive integer",
                        value,
                    })
                }
            },
            None => 5,
        };

        let fcm_send_url = parse_url("FCM_SEND_URL", var("FCM_SEND_URL"))?;
        let fcm_iid_url = parse_url("FCM_IID_URL", var("FCM_IID_URL"))?;

        let log_format = match var("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::Pretty,
            Some(f) if f == "pretty" => LogFormat::Pretty,
            Some(f) if f == "json" => LogFormat::Json,
            Some(value) => {
                return Err(ConfigError::InvalidValue {
                    name: "LOG_FORMAT",
                    expected: "`pretty` or `json`",
                    value,
                })
            }
        };

        Ok(Self {
            host,
            port,
            database_url,
            database_max_connections,
            fcm_send_url,
            fcm_iid_url,
            log_format,
        })
    }

    /// The transport factory with this configuration's endpoint overrides.
    pub fn transport_factory(&self) -> FcmTransportFactory {
        let mut factory = FcmTransportFactory::new();
        if let Some(url) = &self.fcm_send_url {
            factory = factory.with_send_url(url.as_str());
        }
        if let Some(url) = &self.fcm_iid_url {
            factory = factory.with_iid_base_url(url.as_str());
        }
        factory
    }
}

fn parse_url(name: &'static str, value: Option<String>) -> Result<Option<Url>, ConfigError> {
    value
        .map(|v| Url::parse(&v).map_err(|source| ConfigError::InvalidUrl { name, source }))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.database_url, "sqlite://fcm_relay.db?mode=rwc");
        assert_eq!(config.database_max_connections, 5);
        assert!(config.fcm_send_url.is_none());
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("PORT", "9000"),
            ("FCM_IID_URL", "http://localhost:9099"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(
            config.fcm_iid_url.as_ref().map(Url::as_str),
            Some("http://localhost:9099/")
        );
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config(&[("PORT", "http")]),
            Err(ConfigError::InvalidValue { name: "PORT", .. })
        ));
        assert!(matches!(
            config(&[("DATABASE_MAX_CONNECTIONS", "0")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config(&[("FCM_SEND_URL", "not a url")]),
            Err(ConfigError::InvalidUrl { name: "FCM_SEND_URL", .. })
        ));
    }
}
