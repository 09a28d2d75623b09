//! Topic ("group") membership for device tokens.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::token_fingerprint;
use crate::credentials::{CredentialError, CredentialHolder};
use crate::messaging::models::{TopicManagementError, TopicManagementResponse};
use crate::messaging::normalize_topic;


#[derive(Error, Debug)]
pub enum MembershipError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipAction {
    Subscribe,
    Unsubscribe,
}

impl MembershipAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipAction::Subscribe => "subscribe",
            MembershipAction::Unsubscribe => "unsubscribe",
        }
    }

    fn failure_message(&self) -> &'static str {
        match self {
            MembershipAction::Subscribe => "Failed to subscribe to topic",
            MembershipAction::Unsubscribe => "Failed to unsubscribe from topic",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MembershipResult {
    pub success: bool,
    pub detail: MembershipDetail,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum MembershipDetail {
    /// The provider answered with per-token results.
    Counts {
        success_count: usize,
        failure_count: usize,
        errors: Vec<TopicManagementError>,
    },
    /// The provider accepted the request without per-token results.
    Acknowledged { message: String },
    Failed(String),
}

impl From<TopicManagementResponse> for MembershipDetail {
    fn from(response: TopicManagementResponse) -> Self {
        if response.success_count == 0 && response.failure_count == 0 {
            return MembershipDetail::Acknowledged {
                message: "Request accepted".to_string(),
            };
        }
        MembershipDetail::Counts {
            success_count: response.success_count,
            failure_count: response.failure_count,
            errors: response.errors,
        }
    }
}

#[derive(Clone)]
pub struct TopicManager {
    credentials: Arc<CredentialHolder>,
}

impl TopicManager {
    pub fn new(credentials: Arc<CredentialHolder>) -> Self {
        Self { credentials }
    }

    /// Adds `token` to, or removes it from, `topic`. The topic may carry a
    /// `/topics/` prefix.
    pub async fn set_membership(
        &self,
        token: &str,
        topic: &str,
        action: MembershipAction,
    ) -> Result<MembershipResult, MembershipError> {
        if token.trim().is_empty() {
            return Err(MembershipError::InvalidInput(
                "token must not be empty".to_string(),
            ));
        }
        let topic =
            normalize_topic(topic).map_err(|e| MembershipError::InvalidInput(e.to_string()))?;

        let transport = match self.credentials.transport().await {
            Ok(transport) => transport,
            Err(CredentialError::Database(e)) => return Err(MembershipError::Database(e)),
            Err(e) => {
                tracing::warn!(error = %e, "Membership change skipped: push transport unavailable");
                return Ok(MembershipResult {
                    success: false,
                    detail: MembershipDetail::Failed(e.to_string()),
                });
            }
        };

        let tokens = [token];
        let response = match action {
            MembershipAction::Subscribe => transport.subscribe_to_topic(topic, &tokens).await,
            MembershipAction::Unsubscribe => transport.unsubscribe_from_topic(topic, &tokens).await,
        };

        match response {
            Ok(response) => {
                tracing::info!(
                    action = action.as_str(),
                    %topic,
                    token = %token_fingerprint(token),
                    success_count = response.success_count,
                    failure_count = response.failure_count,
                    "Topic membership updated"
                );
                Ok(MembershipResult {
                    success: true,
                    detail: response.into(),
                })
            }
            Err(e) => {
                tracing::error!(action = action.as_str(), %topic, error = %e, "Topic membership change failed");
                Ok(MembershipResult {
                    success: false,
                    detail: MembershipDetail::Failed(action.failure_message().to_string()),
                })
            }
        }
    }
}
