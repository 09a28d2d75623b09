use axum::Router;

use crate::server::state::AppState;

pub mod credentials;
pub mod devices;
pub mod health;
pub mod logs;
pub mod notifications;

/// Routes mounted under `/fcm-config`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(credentials::router())
        .merge(devices::router())
        .merge(notifications::router())
        .merge(logs::router())
}
