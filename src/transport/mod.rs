//! The seam between the relay and the push provider.
//!
//! Everything above this module talks to a [`PushTransport`] and only ever
//! sees provider responses after they have been folded into a
//! [`DeliverySummary`].

use std::sync::Arc;

use jsonwebtoken::EncodingKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use yup_oauth2::ServiceAccountKey;

use crate::core::install_crypto_provider;
use crate::core::middleware::AuthMiddleware;
use crate::credentials::models::PushCredential;
use crate::messaging::models::{BatchResponse, Message, TopicManagementResponse};
use crate::messaging::{FcmEndpoints, FirebaseMessaging, MessagingError};


/// The primitives the relay needs from a push provider.
#[async_trait::async_trait]
pub trait PushTransport: Send + Sync {
    /// Sends a message with its target already set; returns the provider's
    /// message id.
    async fn send(&self, message: &Message) -> Result<String, MessagingError>;

    /// Sends `message` to every token. The i-th response belongs to the
    /// i-th token.
    async fn send_multicast(
        &self,
        message: &Message,
        tokens: &[&str],
    ) -> Result<BatchResponse, MessagingError>;

    async fn subscribe_to_topic(
        &self,
        topic: &str,
        tokens: &[&str],
    ) -> Result<TopicManagementResponse, MessagingError>;

    async fn unsubscribe_from_topic(
        &self,
        topic: &str,
        tokens: &[&str],
    ) -> Result<TopicManagementResponse, MessagingError>;
}

/// A credential that was stored successfully but cannot be turned into a
/// working client.
#[derive(Error, Debug)]
pub enum TransportInitError {
    #[error("credential is not a service account key: {0}")]
    InvalidKey(#[source] serde_json::Error),
    #[error("service account key has no project_id")]
    MissingProjectId,
    #[error("service account private_key is not a valid RSA key: {0}")]
    InvalidPrivateKey(String),
    #[error("invalid transport configuration: {0}")]
    Configuration(String),
}

/// Builds a transport client from the stored credential.
pub trait TransportFactory: Send + Sync {
    fn build(&self, credential: &PushCredential)
        -> Result<Arc<dyn PushTransport>, TransportInitError>;
}

/// Builds [`FirebaseMessaging`] clients. Endpoint overrides apply to every
/// client it builds.
#[derive(Debug, Clone, Default)]
pub struct FcmTransportFactory {
    send_url: Option<String>,
    iid_base_url: Option<String>,
}

impl FcmTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_send_url(mut self, url: impl Into<String>) -> Self {
        self.send_url = Some(url.into());
        self
    }

    pub fn with_iid_base_url(mut self, url: impl Into<String>) -> Self {
        self.iid_base_url = Some(url.into());
        self
    }

    /// Parses and checks a service-account key without building a client.
    pub fn service_account_key(
        credential: &PushCredential,
    ) -> Result<ServiceAccountKey, TransportInitError> {
        let key: ServiceAccountKey = serde_json::from_value(credential.payload.clone())
            .map_err(TransportInitError::InvalidKey)?;

        if key.project_id.as_deref().map_or(true, str::is_empty) {
            return Err(TransportInitError::MissingProjectId);
        }

        EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| TransportInitError::InvalidPrivateKey(e.to_string()))?;

        Ok(key)
    }
}

impl TransportFactory for FcmTransportFactory {
    fn build(
        &self,
        credential: &PushCredential,
    ) -> Result<Arc<dyn PushTransport>, TransportInitError> {
        let key = Self::service_account_key(credential)?;
        let project_id = key.project_id.clone().unwrap_or_default();

        let mut endpoints = FcmEndpoints::for_project(&project_id);
        if let Some(url) = &self.send_url {
            endpoints.send_url = url.clone();
        }
        if let Some(url) = &self.iid_base_url {
            endpoints.iid_base_url = url.trim_end_matches('/').to_string();
        }

        install_crypto_provider();
        tracing::info!(project_id = %project_id, client_email = %key.client_email, "Building FCM transport");

        let middleware = AuthMiddleware::new(key);
        Ok(Arc::new(FirebaseMessaging::with_endpoints(middleware, endpoints)))
    }
}

/// Outcome for one recipient of a dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TargetOutcome {
    pub fn sent(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Uniform result of a send, whatever shape the provider answered with.
///
/// `success_count + failure_count == results.len()` always holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeliverySummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<TargetOutcome>,
}

impl DeliverySummary {
    pub fn from_outcomes(results: Vec<TargetOutcome>) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        Self {
            success_count,
            failure_count: results.len() - success_count,
            results,
        }
    }

    /// One failure entry per recipient, all carrying the same error.
    pub fn all_failed(recipients: usize, error: &str) -> Self {
        Self::from_outcomes(
            (0..recipients)
                .map(|_| TargetOutcome::failed(error))
                .collect(),
        )
    }
}

/// The response shapes a send can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// A single-target or topic send; carries the message id.
    Single(String),
    /// A multicast send.
    Batch(BatchResponse),
}

impl From<SendOutcome> for DeliverySummary {
    fn from(outcome: SendOutcome) -> Self {
        match outcome {
            SendOutcome::Single(message_id) => {
                DeliverySummary::from_outcomes(vec![TargetOutcome::sent(message_id)])
            }
            SendOutcome::Batch(batch) => DeliverySummary::from_outcomes(
                batch
                    .responses
                    .into_iter()
                    .map(|r| TargetOutcome {
                        success: r.success,
                        message_id: r.message_id,
                        error: r.error,
                    })
                    .collect(),
            ),
        }
    }
}
