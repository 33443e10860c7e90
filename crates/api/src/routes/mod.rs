pub mod auth;
pub mod batches;
pub mod health;
pub mod push;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(push::router())
        .merge(batches::router())
        .with_state(state)
}
