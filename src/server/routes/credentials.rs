use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};

use crate::credentials::models::PushCredential;
use crate::server::error::{AppError, AppResult};
use crate::server::state::AppState;

const REDACTED: &str = "[redacted]";

/// The credential as returned over HTTP; the private key never leaves the
/// server.
fn redact(mut credential: PushCredential) -> PushCredential {
    if let Some(key) = credential
        .payload
        .as_object_mut()
        .and_then(|payload| payload.get_mut("private_key"))
    {
        *key = serde_json::Value::String(REDACTED.to_string());
    }
    credential
}

/// GET /fcm-config/upload/
async fn get_credential(State(state): State<AppState>) -> AppResult<Json<PushCredential>> {
    let credential = state.relay.credentials().get().await?;
    Ok(Json(redact(credential)))
}

/// POST|PUT /fcm-config/upload/ -- the request body is the credential JSON.
async fn put_credential(
    State(state): State<AppState>,
    body: String,
) -> AppResult<(StatusCode, Json<PushCredential>)> {
    let (credential, created) = state.relay.credentials().put(&body).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(redact(credential))))
}

async fn delete_credential() -> AppError {
    AppError::MethodNotAllowed("Deleting the credential is not allowed.".to_string())
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/upload/",
        get(get_credential)
            .post(put_credential)
            .put(put_credential)
            .delete(delete_credential),
    )
}
