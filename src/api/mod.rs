use crate::state::StationState;
use axum::Router;
use axum::routing::get;
use std::sync::{Arc, RwLock};

pub mod handlers;
pub mod responses;

pub fn router(state: Arc<RwLock<StationState>>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::get_health))
        .route("/api/bays", get(handlers::get_bays))
        .with_state(state)
}
