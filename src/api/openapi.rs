//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{health, lending};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library Lending API",
        version = "0.1.0",
        description = "Check-out, return, renewal, queue and outstanding request coordination",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        // Lending
        lending::check_out,
        lending::return_copy,
        lending::renew,
        lending::place_request,
        lending::document_queue,
        lending::cancel_queue_entry,
        lending::active_request,
        lending::user_history,
    ),
    components(
        schemas(
            // Requests
            lending::CheckOutRequest,
            lending::LoanActionRequest,
            lending::PlaceRequestBody,
            lending::ActiveRequestResponse,
            // Outcomes
            crate::models::Rejection,
            crate::models::CheckOutOutcome,
            crate::models::CopyDisposition,
            crate::models::ReturnOutcome,
            crate::models::RenewOutcome,
            crate::models::RequestOutcome,
            // Records
            crate::models::CopyStatus,
            crate::models::DocumentCopy,
            crate::models::HistoryEntry,
            crate::models::QueueEntry,
            crate::models::OutstandingRequest,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "lending", description = "Lending coordination")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
