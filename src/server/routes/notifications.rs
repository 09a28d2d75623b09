use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::dispatcher::{DispatchResult, DispatchTarget};
use crate::server::error::AppResult;
use crate::server::extract::JsonOrForm;
use crate::server::state::AppState;

/// Fields shared by every send request.
#[derive(Debug, Deserialize)]
pub struct Content {
    pub title: Option<String>,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
    #[serde(flatten)]
    pub content: Content,
}

#[derive(Debug, Deserialize)]
pub struct TokensRequest {
    pub tokens: Vec<String>,
    #[serde(flatten)]
    pub content: Content,
}

#[derive(Debug, Deserialize)]
pub struct OwnerRequest {
    #[serde(alias = "username")]
    pub owner_id: String,
    #[serde(flatten)]
    pub content: Content,
}

#[derive(Debug, Deserialize)]
pub struct OwnersRequest {
    #[serde(alias = "usernames")]
    pub owner_ids: Vec<String>,
    #[serde(flatten)]
    pub content: Content,
}

#[derive(Debug, Deserialize)]
pub struct TopicRequest {
    #[serde(alias = "group_name")]
    pub topic: String,
    #[serde(flatten)]
    pub content: Content,
}

async fn dispatch(
    state: &AppState,
    content: Content,
    target: DispatchTarget,
) -> AppResult<Json<DispatchResult>> {
    let result = state
        .relay
        .dispatcher()
        .dispatch(content.title.as_deref(), &content.body, target)
        .await?;
    Ok(Json(result))
}

/// POST /fcm-config/send-notification-token/
async fn send_to_token(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<TokenRequest>,
) -> AppResult<Json<DispatchResult>> {
    dispatch(&state, req.content, DispatchTarget::Token(req.token)).await
}

/// POST /fcm-config/send-notification-tokens/
async fn send_to_tokens(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<TokensRequest>,
) -> AppResult<Json<DispatchResult>> {
    dispatch(&state, req.content, DispatchTarget::Tokens(req.tokens)).await
}

/// POST /fcm-config/send-notification-username/
async fn send_to_owner(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<OwnerRequest>,
) -> AppResult<Json<DispatchResult>> {
    dispatch(&state, req.content, DispatchTarget::Owner(req.owner_id)).await
}

/// POST /fcm-config/send-notification-usernames/
async fn send_to_owners(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<OwnersRequest>,
) -> AppResult<Json<DispatchResult>> {
    dispatch(&state, req.content, DispatchTarget::Owners(req.owner_ids)).await
}

/// POST /fcm-config/send-notification-group/
async fn send_to_topic(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<TopicRequest>,
) -> AppResult<Json<DispatchResult>> {
    dispatch(&state, req.content, DispatchTarget::Topic(req.topic)).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/send-notification-token/", post(send_to_token))
        .route("/send-notification-tokens/", post(send_to_tokens))
        .route("/send-notification-username/", post(send_to_owner))
        .route("/send-notification-usernames/", post(send_to_owners))
        .route("/send-notification-group/", post(send_to_topic))
}
