//! Lending endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        CheckOutOutcome, HistoryEntry, OutstandingRequest, Outcome, QueueEntry, RenewOutcome,
        RequestOutcome, ReturnOutcome,
    },
};

/// Check-out request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckOutRequest {
    pub document_id: i32,
    pub user_id: i32,
    /// Librarian performing the operation
    #[validate(length(min = 1, message = "librarian is required"))]
    pub librarian: String,
}

/// Return or renewal request, addressed by ledger entry or by copy
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoanActionRequest {
    pub entry_id: Option<i32>,
    pub copy_id: Option<i32>,
    #[validate(length(min = 1, message = "librarian is required"))]
    pub librarian: String,
}

enum LoanTarget {
    Entry(i32),
    Copy(i32),
}

impl LoanActionRequest {
    fn target(&self) -> AppResult<LoanTarget> {
        match (self.entry_id, self.copy_id) {
            (Some(entry_id), None) => Ok(LoanTarget::Entry(entry_id)),
            (None, Some(copy_id)) => Ok(LoanTarget::Copy(copy_id)),
            _ => Err(AppError::BadRequest(
                "Exactly one of entry_id or copy_id is required".to_string(),
            )),
        }
    }
}

/// Outstanding request placement
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PlaceRequestBody {
    pub document_id: i32,
    pub user_id: i32,
    #[validate(length(min = 1, message = "librarian is required"))]
    pub librarian: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LibrarianQuery {
    /// Librarian performing the operation
    pub librarian: String,
}

/// Active request of a document, if any
#[derive(Serialize, ToSchema)]
pub struct ActiveRequestResponse {
    pub request: Option<OutstandingRequest>,
}

fn validated<T: Validate>(request: &T) -> AppResult<()> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))
}

/// Rejections answer 422 with the outcome body
fn respond<T: Outcome + Serialize>(outcome: T, success: StatusCode) -> (StatusCode, Json<T>) {
    let status = if outcome.is_rejected() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        success
    };
    (status, Json(outcome))
}

/// Check out a document
#[utoipa::path(
    post,
    path = "/lending/checkouts",
    tag = "lending",
    request_body = CheckOutRequest,
    responses(
        (status = 201, description = "Copy checked out", body = CheckOutOutcome),
        (status = 202, description = "No free copy, user queued", body = CheckOutOutcome),
        (status = 404, description = "User or document not found"),
        (status = 422, description = "Check-out refused", body = CheckOutOutcome)
    )
)]
pub async fn check_out(
    State(state): State<crate::AppState>,
    Json(request): Json<CheckOutRequest>,
) -> AppResult<(StatusCode, Json<CheckOutOutcome>)> {
    validated(&request)?;

    let outcome = state
        .services
        .lending
        .check_out(request.document_id, request.user_id, &request.librarian)
        .await?;

    let success = match outcome {
        CheckOutOutcome::Queued { .. } => StatusCode::ACCEPTED,
        _ => StatusCode::CREATED,
    };
    Ok(respond(outcome, success))
}

/// Return a copy
#[utoipa::path(
    post,
    path = "/lending/returns",
    tag = "lending",
    request_body = LoanActionRequest,
    responses(
        (status = 200, description = "Copy returned", body = ReturnOutcome),
        (status = 404, description = "Entry or copy not found"),
        (status = 422, description = "Return refused", body = ReturnOutcome),
        (status = 500, description = "Several open loans on the copy", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_copy(
    State(state): State<crate::AppState>,
    Json(request): Json<LoanActionRequest>,
) -> AppResult<(StatusCode, Json<ReturnOutcome>)> {
    validated(&request)?;

    let lending = &state.services.lending;
    let outcome = match request.target()? {
        LoanTarget::Entry(id) => lending.return_by_entry(id, &request.librarian).await?,
        LoanTarget::Copy(id) => lending.return_by_copy(id, &request.librarian).await?,
    };
    Ok(respond(outcome, StatusCode::OK))
}

/// Renew a loan
#[utoipa::path(
    post,
    path = "/lending/renewals",
    tag = "lending",
    request_body = LoanActionRequest,
    responses(
        (status = 201, description = "Loan renewed", body = RenewOutcome),
        (status = 404, description = "Entry or copy not found"),
        (status = 422, description = "Renewal refused", body = RenewOutcome),
        (status = 500, description = "Several open loans on the copy", body = crate::error::ErrorResponse)
    )
)]
pub async fn renew(
    State(state): State<crate::AppState>,
    Json(request): Json<LoanActionRequest>,
) -> AppResult<(StatusCode, Json<RenewOutcome>)> {
    validated(&request)?;

    let lending = &state.services.lending;
    let outcome = match request.target()? {
        LoanTarget::Entry(id) => lending.renew_by_entry(id, &request.librarian).await?,
        LoanTarget::Copy(id) => lending.renew_by_copy(id, &request.librarian).await?,
    };
    Ok(respond(outcome, StatusCode::CREATED))
}

/// Place an outstanding request
#[utoipa::path(
    post,
    path = "/lending/requests",
    tag = "lending",
    request_body = PlaceRequestBody,
    responses(
        (status = 200, description = "Request placed, copy free, or checked out after flush", body = RequestOutcome),
        (status = 404, description = "User or document not found"),
        (status = 422, description = "Request refused", body = RequestOutcome)
    )
)]
pub async fn place_request(
    State(state): State<crate::AppState>,
    Json(request): Json<PlaceRequestBody>,
) -> AppResult<(StatusCode, Json<RequestOutcome>)> {
    validated(&request)?;

    let outcome = state
        .services
        .lending
        .outstanding_request(request.document_id, request.user_id, &request.librarian)
        .await?;
    Ok(respond(outcome, StatusCode::OK))
}

/// Queue of a document, first in line first
#[utoipa::path(
    get,
    path = "/documents/{id}/queue",
    tag = "lending",
    params(
        ("id" = i32, Path, description = "Document ID")
    ),
    responses(
        (status = 200, description = "Queue entries", body = Vec<QueueEntry>),
        (status = 404, description = "Document not found")
    )
)]
pub async fn document_queue(
    State(state): State<crate::AppState>,
    Path(document_id): Path<i32>,
) -> AppResult<Json<Vec<QueueEntry>>> {
    let queue = state.services.lending.document_queue(document_id).await?;
    Ok(Json(queue))
}

/// Remove a user from a document's queue
#[utoipa::path(
    delete,
    path = "/documents/{id}/queue/{user_id}",
    tag = "lending",
    params(
        ("id" = i32, Path, description = "Document ID"),
        ("user_id" = i32, Path, description = "User ID"),
        LibrarianQuery
    ),
    responses(
        (status = 200, description = "Entry removed", body = QueueEntry),
        (status = 404, description = "User is not queued for this document")
    )
)]
pub async fn cancel_queue_entry(
    State(state): State<crate::AppState>,
    Path((document_id, user_id)): Path<(i32, i32)>,
    Query(query): Query<LibrarianQuery>,
) -> AppResult<Json<QueueEntry>> {
    if query.librarian.is_empty() {
        return Err(AppError::Validation("librarian is required".to_string()));
    }

    state
        .services
        .lending
        .cancel_queue_entry(document_id, user_id, &query.librarian)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "User {} is not queued for document {}",
                user_id, document_id
            ))
        })
}

/// Active outstanding request of a document
#[utoipa::path(
    get,
    path = "/documents/{id}/request",
    tag = "lending",
    params(
        ("id" = i32, Path, description = "Document ID")
    ),
    responses(
        (status = 200, description = "Active request, null when none", body = ActiveRequestResponse),
        (status = 404, description = "Document not found")
    )
)]
pub async fn active_request(
    State(state): State<crate::AppState>,
    Path(document_id): Path<i32>,
) -> AppResult<Json<ActiveRequestResponse>> {
    let request = state.services.lending.active_request(document_id).await?;
    Ok(Json(ActiveRequestResponse { request }))
}

/// Lending history of a user
#[utoipa::path(
    get,
    path = "/users/{id}/history",
    tag = "lending",
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Ledger entries, oldest first", body = Vec<HistoryEntry>),
        (status = 404, description = "User not found")
    )
)]
pub async fn user_history(
    State(state): State<crate::AppState>,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Vec<HistoryEntry>>> {
    let history = state.services.lending.user_history(user_id).await?;
    Ok(Json(history))
}
