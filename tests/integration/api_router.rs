//! Router tests: requests go through the full axum stack

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use library_lending::{api, config::AppConfig, services::Services, AppState};

use crate::common::*;

fn app() -> (Router, Fixture) {
    let fixture = fixture();
    let services = Services {
        lending: fixture.lending.clone(),
    };
    let state = AppState {
        config: Arc::new(AppConfig::default()),
        services: Arc::new(services),
    };
    (api::router(state), fixture)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app();
    let (status, body) = call(&app, Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_check_out_then_queue() {
    let (app, _) = app();
    let checkout = json!({ "document_id": NOVEL, "user_id": ALICE, "librarian": LIBRARIAN });
    let (status, body) = call(&app, Method::POST, "/api/v1/lending/checkouts", Some(checkout)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["outcome"], "checked_out");
    assert_eq!(body["entry"]["copy_id"], NOVEL_COPY);

    let checkout = json!({ "document_id": NOVEL, "user_id": BOB, "librarian": LIBRARIAN });
    let (status, body) = call(&app, Method::POST, "/api/v1/lending/checkouts", Some(checkout)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["outcome"], "queued");

    let (status, body) = call(&app, Method::GET, &format!("/api/v1/documents/{}/queue", NOVEL), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["user_id"], BOB);
}

#[tokio::test]
async fn test_rejection_is_unprocessable() {
    let (app, _) = app();
    let checkout = json!({ "document_id": DICTIONARY, "user_id": ALICE, "librarian": LIBRARIAN });
    let (status, body) = call(&app, Method::POST, "/api/v1/lending/checkouts", Some(checkout)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["outcome"], "rejected");
    assert_eq!(body["reason"], "non_circulating");
}

#[tokio::test]
async fn test_missing_librarian_is_a_validation_error() {
    let (app, _) = app();
    let checkout = json!({ "document_id": NOVEL, "user_id": ALICE, "librarian": "" });
    let (status, _) = call(&app, Method::POST, "/api/v1/lending/checkouts", Some(checkout)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let (app, _) = app();
    let checkout = json!({ "document_id": NOVEL, "user_id": 999, "librarian": LIBRARIAN });
    let (status, _) = call(&app, Method::POST, "/api/v1/lending/checkouts", Some(checkout)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_return_needs_exactly_one_target() {
    let (app, _) = app();
    let both = json!({ "entry_id": 1, "copy_id": NOVEL_COPY, "librarian": LIBRARIAN });
    let (status, _) = call(&app, Method::POST, "/api/v1/lending/returns", Some(both)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let neither = json!({ "librarian": LIBRARIAN });
    let (status, _) = call(&app, Method::POST, "/api/v1/lending/returns", Some(neither)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_return_and_renew_by_copy() {
    let (app, fixture) = app();
    backdated_loan(&fixture.store, 500, ALICE, NOVEL_COPY, 30);

    let renew = json!({ "copy_id": NOVEL_COPY, "librarian": LIBRARIAN });
    let (status, body) = call(&app, Method::POST, "/api/v1/lending/renewals", Some(renew)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["reason"], "overdue");

    let ret = json!({ "entry_id": 500, "librarian": LIBRARIAN });
    let (status, body) = call(&app, Method::POST, "/api/v1/lending/returns", Some(ret)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "returned");
    assert_eq!(body["fine"], 900);
    assert_eq!(body["copy"]["disposition"], "no_claimants");

    let (status, body) = call(&app, Method::GET, &format!("/api/v1/users/{}/history", ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["librarian_re"], LIBRARIAN);
}

#[tokio::test]
async fn test_inconsistent_ledger_is_a_server_error() {
    let (app, fixture) = app();
    backdated_loan(&fixture.store, 500, ALICE, NOVEL_COPY, 3);
    backdated_loan(&fixture.store, 501, BOB, NOVEL_COPY, 2);

    let ret = json!({ "copy_id": NOVEL_COPY, "librarian": LIBRARIAN });
    let (status, body) = call(&app, Method::POST, "/api/v1/lending/returns", Some(ret)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], 22);
}

#[tokio::test]
async fn test_request_lifecycle() {
    let (app, _) = app();
    let checkout = json!({ "document_id": NOVEL, "user_id": ALICE, "librarian": LIBRARIAN });
    call(&app, Method::POST, "/api/v1/lending/checkouts", Some(checkout)).await;

    let request = json!({ "document_id": NOVEL, "user_id": CAROL, "librarian": LIBRARIAN });
    let (status, body) = call(&app, Method::POST, "/api/v1/lending/requests", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "request_placed");

    let uri = format!("/api/v1/documents/{}/request", NOVEL);
    let (status, body) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"]["user_id"], CAROL);

    let ret = json!({ "copy_id": NOVEL_COPY, "librarian": LIBRARIAN });
    let (_, body) = call(&app, Method::POST, "/api/v1/lending/returns", Some(ret)).await;
    assert_eq!(body["copy"]["disposition"], "fulfilled_request");
    assert_eq!(body["copy"]["entry"]["user_id"], CAROL);

    let (_, body) = call(&app, Method::GET, &uri, None).await;
    assert!(body["request"].is_null());
}

#[tokio::test]
async fn test_cancel_queue_entry() {
    let (app, _) = app();
    for user_id in [ALICE, BOB] {
        let checkout = json!({ "document_id": NOVEL, "user_id": user_id, "librarian": LIBRARIAN });
        call(&app, Method::POST, "/api/v1/lending/checkouts", Some(checkout)).await;
    }

    let uri = format!("/api/v1/documents/{}/queue/{}?librarian={}", NOVEL, BOB, LIBRARIAN);
    let (status, body) = call(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], BOB);

    let (status, _) = call(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
