//! HTTP front of the round coordinator.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use fedround_core::Coordinator;

pub mod error;
pub mod forms;
pub mod handlers;
pub mod health;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    pub fn new(coordinator: Coordinator) -> Self { Self { coordinator: Arc::new(coordinator) } }
}

/// `/clients/:key/...` shares one parameter name; the history route reads it as an id.
pub fn build_router(state: AppState, service: &str, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/participants", post(handlers::register_participant).get(handlers::search_participants))
        .route("/iterations", post(handlers::create_iteration).get(handlers::list_iterations))
        .route("/iterations/running", get(handlers::list_running_iterations))
        .route("/iterations/:id", put(handlers::update_iteration).patch(handlers::update_iteration))
        .route("/iterations/:id/clients", get(handlers::iteration_clients))
        .route("/iterations/:id/submissions", get(handlers::iteration_submissions))
        .route("/assignments", post(handlers::create_assignment))
        .route("/assignments/owner/:email", get(handlers::owner_assignments))
        .route("/clients/:key/dashboard", get(handlers::client_dashboard))
        .route("/clients/:key/current-iterations", get(handlers::client_current_iterations))
        .route("/clients/:key/iterations", get(handlers::client_iterations))
        .route("/submissions", post(handlers::submit_model))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
        .merge(health::routes(service.to_string()))
}
