use futures::stream::{self, StreamExt};
use reqwest::{header, Client};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::middleware::AuthMiddleware;
use crate::core::parse_error_response;
use crate::messaging::models::{
    BatchResponse, Message, SendResponse, SendResponseInternal, TopicManagementError,
    TopicManagementResponse,
};

pub mod models;
#[cfg(test)]
mod tests;

/// Upper bound on messages in one `send_each` call.
pub const MAX_BATCH_SIZE: usize = 500;
/// Upper bound on tokens in one Instance ID batch request.
pub const MAX_TOPIC_BATCH_SIZE: usize = 1000;
/// Number of v1 send requests kept in flight during a fan-out.
const MAX_CONCURRENT_SENDS: usize = 16;

const FCM_V1_API: &str = "https://fcm.googleapis.com/v1/projects/{project_id}/messages:send";
const IID_API: &str = "https://iid.googleapis.com";

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Where the client sends its requests. Production values are derived from
/// the project id; tests and emulators override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FcmEndpoints {
    /// Full URL of the v1 `messages:send` method.
    pub send_url: String,
    /// Base URL of the Instance ID service; `/iid/v1:batchAdd` and
    /// `/iid/v1:batchRemove` are appended.
    pub iid_base_url: String,
}

impl FcmEndpoints {
    pub fn for_project(project_id: &str) -> Self {
        Self {
            send_url: FCM_V1_API.replace("{project_id}", project_id),
            iid_base_url: IID_API.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct FirebaseMessaging {
    client: ClientWithMiddleware,
    endpoints: FcmEndpoints,
}

// Wrapper for the request body required by FCM v1 API
#[derive(Serialize)]
struct SendRequest<'a> {
    message: &'a Message,
}

#[derive(Serialize)]
struct TopicManagementRequest<'a> {
    to: String,
    registration_tokens: &'a [&'a str],
}

#[derive(Deserialize)]
struct TopicManagementApiResponse {
    results: Option<Vec<TopicManagementApiResult>>,
}

#[derive(Deserialize)]
struct TopicManagementApiResult {
    error: Option<String>,
}

/// Strips an optional `/topics/` prefix and checks the name against the
/// characters FCM accepts in topic names.
pub fn normalize_topic(topic: &str) -> Result<&str, MessagingError> {
    let name = topic.strip_prefix("/topics/").unwrap_or(topic);
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '%'));
    if valid {
        Ok(name)
    } else {
        Err(MessagingError::InvalidMessage(format!(
            "Invalid topic name: {:?}",
            topic
        )))
    }
}

async fn post_message(
    client: &ClientWithMiddleware,
    send_url: &str,
    message: &Message,
) -> Result<String, MessagingError> {
    let request = SendRequest { message };

    let response = client
        .post(send_url)
        .header(header::CONTENT_TYPE, "application/json")
        .body(serde_json::to_vec(&request)?)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(MessagingError::ApiError(
            parse_error_response(response, "FCM send failed").await,
        ));
    }

    let result: SendResponseInternal = response.json().await?;
    Ok(result.name)
}

impl FirebaseMessaging {
    pub fn new(middleware: AuthMiddleware) -> Self {
        let project_id = middleware.project_id().unwrap_or_default().to_string();
        Self::with_endpoints(middleware, FcmEndpoints::for_project(&project_id))
    }

    pub fn with_endpoints(middleware: AuthMiddleware, endpoints: FcmEndpoints) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

        let client = ClientBuilder::new(Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .with(middleware)
            .build();

        Self { client, endpoints }
    }

    pub fn endpoints(&self) -> &FcmEndpoints {
        &self.endpoints
    }

    pub async fn send(&self, message: &Message) -> Result<String, MessagingError> {
        self.validate_message(message)?;
        self.send_request(message).await
    }

    fn validate_message(&self, message: &Message) -> Result<(), MessagingError> {
        let num_targets = [message.token.is_some(), message.topic.is_some()]
            .iter()
            .filter(|&&t| t)
            .count();

        if num_targets != 1 {
            return Err(MessagingError::InvalidMessage(
                "Message must have exactly one of token or topic.".to_string(),
            ));
        }

        Ok(())
    }

    async fn send_request(&self, message: &Message) -> Result<String, MessagingError> {
        post_message(&self.client, &self.endpoints.send_url, message).await
    }

    /// Sends every message individually and reports one [`SendResponse`] per
    /// message, in input order. Any error while sending a message is
    /// recorded as a failure of that element; only validation errors fail
    /// the whole call.
    pub async fn send_each(&self, messages: &[Message]) -> Result<BatchResponse, MessagingError> {
        for message in messages {
            self.validate_message(message)?;
        }

        if messages.is_empty() {
            return Ok(BatchResponse::default());
        }

        if messages.len() > MAX_BATCH_SIZE {
            return Err(MessagingError::InvalidMessage(format!(
                "Cannot send more than {} messages in a single batch.",
                MAX_BATCH_SIZE
            )));
        }

        let sends: Vec<_> = messages
            .iter()
            .cloned()
            .map(|message| {
                let client = self.client.clone();
                let send_url = self.endpoints.send_url.clone();
                async move { post_message(&client, &send_url, &message).await }
            })
            .collect();

        let outcomes: Vec<Result<String, MessagingError>> = stream::iter(sends)
            .buffered(MAX_CONCURRENT_SENDS)
            .collect()
            .await;

        let responses = outcomes
            .into_iter()
            .map(|outcome| match outcome {
                Ok(name) => SendResponse::sent(name),
                Err(MessagingError::ApiError(reason)) => SendResponse::failed(reason),
                Err(e) => SendResponse::failed(e.to_string()),
            })
            .collect();

        Ok(BatchResponse::from_responses(responses))
    }

    /// Sends `base_message` to every token. Token lists longer than
    /// [`MAX_BATCH_SIZE`] are split into consecutive batches; the combined
    /// response keeps the order of `tokens`.
    pub async fn send_multicast(
        &self,
        base_message: &Message,
        tokens: &[&str],
    ) -> Result<BatchResponse, MessagingError> {
        if base_message.token.is_some() || base_message.topic.is_some() {
            return Err(MessagingError::InvalidMessage(
                "Multicast base message must not have a target (token or topic).".to_string(),
            ));
        }

        let mut responses = Vec::with_capacity(tokens.len());
        for chunk in tokens.chunks(MAX_BATCH_SIZE) {
            let messages: Vec<Message> = chunk
                .iter()
                .map(|token| base_message.clone().with_token(*token))
                .collect();

            let batch = self.send_each(&messages).await?;
            responses.extend(batch.responses);
        }

        Ok(BatchResponse::from_responses(responses))
    }

    pub async fn subscribe_to_topic(
        &self,
        topic: &str,
        tokens: &[&str],
    ) -> Result<TopicManagementResponse, MessagingError> {
        self.manage_topic(topic, tokens, true).await
    }

    pub async fn unsubscribe_from_topic(
        &self,
        topic: &str,
        tokens: &[&str],
    ) -> Result<TopicManagementResponse, MessagingError> {
        self.manage_topic(topic, tokens, false).await
    }

    async fn manage_topic(
        &self,
        topic: &str,
        tokens: &[&str],
        subscribe: bool,
    ) -> Result<TopicManagementResponse, MessagingError> {
        if tokens.is_empty() {
            return Err(MessagingError::InvalidMessage(
                "At least one registration token is required.".to_string(),
            ));
        }

        let topic_path = format!("/topics/{}", normalize_topic(topic)?);

        let url = if subscribe {
            format!("{}/iid/v1:batchAdd", self.endpoints.iid_base_url)
        } else {
            format!("{}/iid/v1:batchRemove", self.endpoints.iid_base_url)
        };

        let mut response_summary = TopicManagementResponse::default();

        for (batch_idx, chunk) in tokens.chunks(MAX_TOPIC_BATCH_SIZE).enumerate() {
            let request = TopicManagementRequest {
                to: topic_path.clone(),
                registration_tokens: chunk,
            };

            let response = self
                .client
                .post(&url)
                .header(header::CONTENT_TYPE, "application/json")
                .header("access_token_auth", "true")
                .body(serde_json::to_vec(&request)?)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(MessagingError::ApiError(
                    parse_error_response(response, "Topic management failed").await,
                ));
            }

            let api_response: TopicManagementApiResponse = response.json().await?;

            if let Some(results) = api_response.results {
                for (i, result) in results.iter().enumerate() {
                    if let Some(error) = &result.error {
                        response_summary.failure_count += 1;
                        response_summary.errors.push(TopicManagementError {
                            index: batch_idx * MAX_TOPIC_BATCH_SIZE + i,
                            reason: error.clone(),
                        });
                    } else {
                        response_summary.success_count += 1;
                    }
                }
            }
        }

        Ok(response_summary)
    }
}

#[async_trait::async_trait]
impl crate::transport::PushTransport for FirebaseMessaging {
    async fn send(&self, message: &Message) -> Result<String, MessagingError> {
        FirebaseMessaging::send(self, message).await
    }

    async fn send_multicast(
        &self,
        message: &Message,
        tokens: &[&str],
    ) -> Result<BatchResponse, MessagingError> {
        FirebaseMessaging::send_multicast(self, message, tokens).await
    }

    async fn subscribe_to_topic(
        &self,
        topic: &str,
        tokens: &[&str],
    ) -> Result<TopicManagementResponse, MessagingError> {
        FirebaseMessaging::subscribe_to_topic(self, topic, tokens).await
    }

    async fn unsubscribe_from_topic(
        &self,
        topic: &str,
        tokens: &[&str],
    ) -> Result<TopicManagementResponse, MessagingError> {
        FirebaseMessaging::unsubscribe_from_topic(self, topic, tokens).await
    }
}
