use crate::FcmRelay;

/// Shared application state available to all handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub relay: FcmRelay,
}

impl AppState {
    pub fn new(relay: FcmRelay) -> Self {
        Self { relay }
    }
}
