use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::registrations::models::{DeviceRegistration, Platform, RegistrationInput};
use crate::server::error::{AppError, AppResult};
use crate::server::extract::JsonOrForm;
use crate::server::state::AppState;
use crate::topics::{MembershipAction, MembershipResult};

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    #[serde(alias = "username")]
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    #[serde(alias = "username")]
    pub owner_id: String,
    #[serde(alias = "uuid")]
    pub device_id: String,
    pub token: String,
    pub platform: Option<String>,
    pub os_version: Option<String>,
    pub device_model: Option<String>,
}

impl TryFrom<RegisterDeviceRequest> for RegistrationInput {
    type Error = AppError;

    fn try_from(req: RegisterDeviceRequest) -> Result<Self, Self::Error> {
        let platform = req
            .platform
            .as_deref()
            .map(str::parse::<Platform>)
            .transpose()
            .map_err(AppError::BadRequest)?;

        Ok(RegistrationInput {
            owner_id: req.owner_id,
            device_id: req.device_id,
            token: req.token,
            platform,
            os_version: req.os_version,
            device_model: req.device_model,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct DeviceKey {
    #[serde(alias = "username")]
    pub owner_id: String,
    #[serde(alias = "uuid")]
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MembershipRequest {
    #[serde(alias = "device_token")]
    pub token: String,
    #[serde(alias = "group_name")]
    pub topic: String,
    pub action: String,
}

/// GET /fcm-config/devices/
async fn list_devices(State(state): State<AppState>) -> AppResult<Json<Vec<DeviceRegistration>>> {
    Ok(Json(state.relay.registrations().list(None).await?))
}

/// GET /fcm-config/device/?owner_id=
async fn list_owner_devices(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> AppResult<Json<Vec<DeviceRegistration>>> {
    let owner_id = query
        .owner_id
        .filter(|o| !o.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("owner_id is required.".to_string()))?;

    let devices = state.relay.registrations().list(Some(&owner_id)).await?;
    if devices.is_empty() {
        return Err(AppError::NotFound(format!(
            "No devices registered for {owner_id:?}"
        )));
    }
    Ok(Json(devices))
}

/// POST /fcm-config/device/
async fn register_device(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<RegisterDeviceRequest>,
) -> AppResult<(StatusCode, Json<DeviceRegistration>)> {
    let input = RegistrationInput::try_from(req)?;
    let (registration, created) = state.relay.registrations().upsert(&input).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(registration)))
}

/// DELETE /fcm-config/device/
async fn remove_device(
    State(state): State<AppState>,
    JsonOrForm(key): JsonOrForm<DeviceKey>,
) -> AppResult<StatusCode> {
    state
        .relay
        .registrations()
        .remove(&key.owner_id, &key.device_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /fcm-config/device/deactivate/
async fn deactivate_device(
    State(state): State<AppState>,
    JsonOrForm(key): JsonOrForm<DeviceKey>,
) -> AppResult<Json<DeviceRegistration>> {
    let registration = state
        .relay
        .registrations()
        .deactivate(&key.owner_id, &key.device_id)
        .await?;
    Ok(Json(registration))
}

/// POST /fcm-config/device-group/
async fn device_group(
    State(state): State<AppState>,
    JsonOrForm(req): JsonOrForm<MembershipRequest>,
) -> AppResult<Json<MembershipResult>> {
    let action = match req.action.trim().to_ascii_lowercase().as_str() {
        "subscribe" => MembershipAction::Subscribe,
        "unsubscribe" => MembershipAction::Unsubscribe,
        _ => {
            return Err(AppError::BadRequest(
                "action must be either subscribe or unsubscribe".to_string(),
            ))
        }
    };

    let result = state
        .relay
        .topics()
        .set_membership(&req.token, &req.topic, action)
        .await?;
    Ok(Json(result))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/devices/", get(list_devices))
        .route(
            "/device/",
            get(list_owner_devices)
                .post(register_device)
                .delete(remove_device),
        )
        .route("/device/deactivate/", post(deactivate_device))
        .route("/device-group/", post(device_group))
}
