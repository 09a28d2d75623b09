//! HTTP surface.

use axum::Router;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::FcmRelay;

pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use error::{AppError, AppResult};
pub use state::AppState;

/// The full application router.
pub fn router(relay: FcmRelay) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/fcm-config", routes::api_routes())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(AppState::new(relay))
}
