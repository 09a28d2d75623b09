use serde::{Deserialize, Serialize};

/// Represents a message to be sent via FCM.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Basic notification template to use across all platforms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,

    /// Registration token to send a message to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Topic name to send a message to, e.g. "weather".
    /// Note: "/topics/" prefix should not be provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl Message {
    /// A message carrying only a notification, with no target set.
    pub fn notification(title: Option<&str>, body: &str) -> Self {
        Self {
            notification: Some(Notification {
                title: title.map(str::to_string),
                body: Some(body.to_string()),
            }),
            ..Default::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

/// Basic notification template to use across all platforms.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// The notification's title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// The notification's body text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Response from the topic management APIs.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopicManagementResponse {
    /// The number of tokens successfully subscribed/unsubscribed.
    pub success_count: usize,
    /// The number of tokens that failed to subscribe/unsubscribe.
    pub failure_count: usize,
    /// The list of errors.
    pub errors: Vec<TopicManagementError>,
}

/// Error details for a single registration token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopicManagementError {
    /// The index of the token in the request list.
    pub index: usize,
    /// The error message.
    pub reason: String,
}

/// Response from a batch send operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResponse {
    /// The number of messages successfully sent.
    pub success_count: usize,
    /// The number of messages that failed to send.
    pub failure_count: usize,
    /// The list of responses for each message, in request order.
    pub responses: Vec<SendResponse>,
}

impl BatchResponse {
    pub fn from_responses(responses: Vec<SendResponse>) -> Self {
        let success_count = responses.iter().filter(|r| r.success).count();
        let failure_count = responses.len() - success_count;
        Self {
            success_count,
            failure_count,
            responses,
        }
    }
}

/// Response for an individual message in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SendResponse {
    /// Whether the message was sent successfully.
    pub success: bool,
    /// The message ID, if sent successfully.
    pub message_id: Option<String>,
    /// The error message, if failed.
    pub error: Option<String>,
}

impl SendResponse {
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

#[derive(Debug, Deserialize)]
pub(crate) struct SendResponseInternal {
    pub name: String,
}
