pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::pipeline::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/resumes/:id", get(handlers::handle_get_resume))
        .route(
            "/api/v1/resumes/:id/analyze",
            post(handlers::handle_analyze),
        )
        .route(
            "/api/v1/resumes/:id/analyses",
            get(handlers::handle_list_analyses),
        )
        .with_state(state)
}
