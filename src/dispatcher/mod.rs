//! Notification fan-out.
//!
//! A dispatch resolves its target into recipients, makes one transport call,
//! folds the provider's answer into a [`DeliverySummary`] and appends exactly
//! one delivery-log entry. Transport failures are reported in the returned
//! [`DispatchResult`]; only caller mistakes and storage failures are errors.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::core::token_fingerprint;
use crate::credentials::{CredentialError, CredentialHolder};
use crate::delivery_log::{DeliveryLog, DeliveryLogError, NewDeliveryRecord};
use crate::messaging::models::Message;
use crate::messaging::normalize_topic;
use crate::registrations::{RegistrationError, RegistrationStore};
use crate::transport::{DeliverySummary, SendOutcome};


/// What callers see when the provider call failed; the provider's own text
/// goes to the server log and the delivery log.
pub const SEND_FAILED_MESSAGE: &str = "Notification sending failed";

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("No active registrations found for the requested recipients")]
    NoRecipients,
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    DeliveryLog(#[from] DeliveryLogError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A logical send target.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchTarget {
    Token(String),
    Tokens(Vec<String>),
    Owner(String),
    Owners(Vec<String>),
    Topic(String),
}

impl DispatchTarget {
    fn kind(&self) -> &'static str {
        match self {
            DispatchTarget::Token(_) => "token",
            DispatchTarget::Tokens(_) => "tokens",
            DispatchTarget::Owner(_) => "owner",
            DispatchTarget::Owners(_) => "owners",
            DispatchTarget::Topic(_) => "topic",
        }
    }

    fn validate(&self) -> Result<(), DispatchError> {
        fn one(field: &str, value: &str) -> Result<(), DispatchError> {
            if value.trim().is_empty() {
                return Err(DispatchError::InvalidInput(format!("{field} must not be empty")));
            }
            Ok(())
        }

        fn many(field: &str, values: &[String]) -> Result<(), DispatchError> {
            if values.is_empty() {
                return Err(DispatchError::InvalidInput(format!(
                    "{field} must contain at least one entry"
                )));
            }
            values.iter().try_for_each(|v| one(field, v))
        }

        match self {
            DispatchTarget::Token(token) => one("token", token),
            DispatchTarget::Tokens(tokens) => many("tokens", tokens),
            DispatchTarget::Owner(owner) => one("owner_id", owner),
            DispatchTarget::Owners(owners) => many("owner_ids", owners),
            DispatchTarget::Topic(topic) => normalize_topic(topic)
                .map(|_| ())
                .map_err(|e| DispatchError::InvalidInput(e.to_string())),
        }
    }
}

/// Outcome of a dispatch.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DispatchResult {
    pub success: bool,
    pub detail: DispatchDetail,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum DispatchDetail {
    Delivered(DeliverySummary),
    Failed(String),
}

impl DispatchResult {
    fn delivered(summary: DeliverySummary) -> Self {
        Self {
            success: true,
            detail: DispatchDetail::Delivered(summary),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: DispatchDetail::Failed(message.into()),
        }
    }

    pub fn summary(&self) -> Option<&DeliverySummary> {
        match &self.detail {
            DispatchDetail::Delivered(summary) => Some(summary),
            DispatchDetail::Failed(_) => None,
        }
    }
}

/// Recipients after resolution, and how the transport is to be called.
enum Recipients {
    Single(String),
    Multicast { owners: Vec<String>, tokens: Vec<String> },
    Topic(String),
}

impl Recipients {
    fn len(&self) -> usize {
        match self {
            Recipients::Multicast { tokens, .. } => tokens.len(),
            Recipients::Single(_) | Recipients::Topic(_) => 1,
        }
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn into_log_parts(self) -> (Vec<String>, Vec<String>) {
        match self {
            Recipients::Single(token) => (Vec::new(), vec![token]),
            Recipients::Multicast { owners, tokens } => (owners, tokens),
            Recipients::Topic(topic) => (Vec::new(), vec![topic]),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    registrations: RegistrationStore,
    credentials: Arc<CredentialHolder>,
    log: DeliveryLog,
}

impl Dispatcher {
    pub fn new(
        registrations: RegistrationStore,
        credentials: Arc<CredentialHolder>,
        log: DeliveryLog,
    ) -> Self {
        Self {
            registrations,
            credentials,
            log,
        }
    }

    pub async fn send_to_token(
        &self,
        title: Option<&str>,
        body: &str,
        token: &str,
    ) -> Result<DispatchResult, DispatchError> {
        self.dispatch(title, body, DispatchTarget::Token(token.to_string()))
            .await
    }

    pub async fn send_to_tokens(
        &self,
        title: Option<&str>,
        body: &str,
        tokens: &[String],
    ) -> Result<DispatchResult, DispatchError> {
        self.dispatch(title, body, DispatchTarget::Tokens(tokens.to_vec()))
            .await
    }

    pub async fn send_to_owner(
        &self,
        title: Option<&str>,
        body: &str,
        owner_id: &str,
    ) -> Result<DispatchResult, DispatchError> {
        self.dispatch(title, body, DispatchTarget::Owner(owner_id.to_string()))
            .await
    }

    pub async fn send_to_owners(
        &self,
        title: Option<&str>,
        body: &str,
        owner_ids: &[String],
    ) -> Result<DispatchResult, DispatchError> {
        self.dispatch(title, body, DispatchTarget::Owners(owner_ids.to_vec()))
            .await
    }

    pub async fn send_to_topic(
        &self,
        title: Option<&str>,
        body: &str,
        topic: &str,
    ) -> Result<DispatchResult, DispatchError> {
        self.dispatch(title, body, DispatchTarget::Topic(topic.to_string()))
            .await
    }

    pub async fn dispatch(
        &self,
        title: Option<&str>,
        body: &str,
        target: DispatchTarget,
    ) -> Result<DispatchResult, DispatchError> {
        if body.trim().is_empty() {
            return Err(DispatchError::InvalidInput("body must not be empty".to_string()));
        }
        target.validate()?;

        let kind = target.kind();
        let transport = match self.credentials.transport().await {
            Ok(transport) => transport,
            Err(CredentialError::Database(e)) => return Err(DispatchError::Database(e)),
            Err(e) => {
                tracing::warn!(target_kind = kind, error = %e, "Dispatch skipped: push transport unavailable");
                return Ok(DispatchResult::failed(e.to_string()));
            }
        };

        let recipients = self.resolve(target).await?;
        if recipients.is_empty() {
            tracing::info!(target_kind = kind, "Dispatch skipped: no recipients");
            return Err(DispatchError::NoRecipients);
        }
        let count = recipients.len();
        tracing::info!(target_kind = kind, recipients = count, "Dispatching notification");

        let message = Message::notification(title, body);
        let outcome = match &recipients {
            Recipients::Single(token) => {
                tracing::debug!(token = %token_fingerprint(token), "Sending to single token");
                transport
                    .send(&message.with_token(token.as_str()))
                    .await
                    .map(SendOutcome::Single)
            }
            Recipients::Multicast { tokens, .. } => {
                let tokens: Vec<&str> = tokens.iter().map(String::as_str).collect();
                transport
                    .send_multicast(&message, &tokens)
                    .await
                    .map(SendOutcome::Batch)
            }
            Recipients::Topic(topic) => transport
                .send(&message.with_topic(topic.as_str()))
                .await
                .map(SendOutcome::Single),
        };

        let (success, summary) = match outcome {
            Ok(outcome) => (true, DeliverySummary::from(outcome)),
            Err(e) => {
                tracing::error!(target_kind = kind, recipients = count, error = %e, "Notification send failed");
                (false, DeliverySummary::all_failed(count, &e.to_string()))
            }
        };

        let (owners, targets) = recipients.into_log_parts();
        let entry = self
            .log
            .append(NewDeliveryRecord {
                owners,
                targets,
                title: title.map(str::to_string),
                body: body.to_string(),
                summary: summary.clone(),
            })
            .await?;

        tracing::info!(
            target_kind = kind,
            log_id = entry.id,
            success_count = summary.success_count,
            failure_count = summary.failure_count,
            "Dispatch finished"
        );

        Ok(if success {
            DispatchResult::delivered(summary)
        } else {
            DispatchResult::failed(SEND_FAILED_MESSAGE)
        })
    }

    async fn resolve(&self, target: DispatchTarget) -> Result<Recipients, DispatchError> {
        let recipients = match target {
            DispatchTarget::Token(token) => Recipients::Single(token),
            DispatchTarget::Tokens(tokens) => Recipients::Multicast {
                owners: Vec::new(),
                tokens,
            },
            DispatchTarget::Owner(owner_id) => {
                let owners = vec![owner_id];
                let tokens = self.registrations.resolve_tokens(&owners).await?;
                Recipients::Multicast { owners, tokens }
            }
            DispatchTarget::Owners(owners) => {
                let tokens = self.registrations.resolve_tokens(&owners).await?;
                Recipients::Multicast { owners, tokens }
            }
            DispatchTarget::Topic(topic) => {
                let name = normalize_topic(&topic)
                    .map_err(|e| DispatchError::InvalidInput(e.to_string()))?;
                Recipients::Topic(name.to_string())
            }
        };
        Ok(recipients)
    }
}
