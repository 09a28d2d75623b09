use axum::extract::{Query, State};
use axum::{routing::get, Json, Router};
use serde::Deserialize;

use crate::delivery_log::DeliveryLogEntry;
use crate::server::error::AppResult;
use crate::server::state::AppState;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<u32>,
}

/// GET /fcm-config/logs/?limit= -- newest entries first.
async fn recent_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> AppResult<Json<Vec<DeliveryLogEntry>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    Ok(Json(state.relay.delivery_log().list_recent(limit).await?))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/logs/", get(recent_logs))
}
