pub mod events;
pub mod health;
pub mod jobs;
pub mod network;
pub mod workers;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(jobs::router())
        .merge(workers::router())
        .merge(network::router())
        .merge(events::router())
        .with_state(state)
}
