//! API handlers for the lending REST endpoints

pub mod health;
pub mod lending;
pub mod openapi;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Lending operations
        .route("/lending/checkouts", post(lending::check_out))
        .route("/lending/returns", post(lending::return_copy))
        .route("/lending/renewals", post(lending::renew))
        .route("/lending/requests", post(lending::place_request))
        // Per-document state
        .route("/documents/:id/queue", get(lending::document_queue))
        .route(
            "/documents/:id/queue/:user_id",
            delete(lending::cancel_queue_entry),
        )
        .route("/documents/:id/request", get(lending::active_request))
        // Per-user state
        .route("/users/:id/history", get(lending::user_history))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
