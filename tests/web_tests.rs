//! HTTP surface: submission, status and the approval webhook.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::TestPromoter;
use promoter_core::web::create_router;
use promoter_core::web::handlers::respond::NOT_ACCEPTED_MESSAGE;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn wait_for_status(app: &Router, execution_id: &str, expected: &str) -> Value {
    for _ in 0..100 {
        let (status, body) = send(app, get(&format!("/v1/executions/{execution_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        let execution: Value = serde_json::from_str(&body).unwrap();
        if execution["status"] == expected {
            return execution;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("execution {execution_id} never reached {expected}");
}

#[tokio::test]
async fn test_health() {
    let promoter = TestPromoter::new();
    let app = create_router(promoter.system.app_state());
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "ok");
}

#[tokio::test]
async fn test_submission_missing_fields_is_rejected() {
    let promoter = TestPromoter::new();
    let app = create_router(promoter.system.app_state());

    let (status, body) = send(
        &app,
        post_json(
            "/v1/executions",
            &json!({"context": {"endpoint_name": "churn-endpoint"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: Value = serde_json::from_str(&body).unwrap();
    assert!(error["message"].as_str().unwrap().contains("training_job"));
}

#[tokio::test]
async fn test_unknown_execution_is_not_found() {
    let promoter = TestPromoter::new();
    let app = create_router(promoter.system.app_state());

    let (status, _) = send(&app, get(&format!("/v1/executions/{}", Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/v1/executions/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_respond_requires_token_and_known_action() {
    let promoter = TestPromoter::new();
    let app = create_router(promoter.system.app_state());

    let (status, body) = send(&app, get("/respond?action=Approved")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("<html>"));

    let (status, _) = send(&app, get("/respond?token=abc&action=Maybe")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, get("/respond?token=abc&action=Approved")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(NOT_ACCEPTED_MESSAGE));
}

#[tokio::test(start_paused = true)]
async fn test_submit_approve_and_follow_to_success() {
    let mut promoter = TestPromoter::new();
    promoter.system.start_background();
    let app = create_router(promoter.system.app_state());

    let (status, body) = send(
        &app,
        post_json("/v1/executions", &json!({"context": common::submission(common::ENDPOINT)})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let submitted: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(submitted["pipeline"], "model-promotion@1");
    let execution_id = submitted["execution_id"].as_str().unwrap().to_string();

    let suspended = wait_for_status(&app, &execution_id, "Suspended").await;
    assert_eq!(suspended["awaiting_callback"], true);
    assert_eq!(suspended["current_step"], "RequestApproval");

    let notification = promoter.notifier.last().unwrap();
    let path = notification
        .approve_url
        .strip_prefix("https://promoter.test")
        .unwrap()
        .to_string();

    let (status, body) = send(&app, get(&path)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Thank you. Your response (Approved) has been recorded."));

    let (status, body) = send(&app, get(&path)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(NOT_ACCEPTED_MESSAGE));

    let done = wait_for_status(&app, &execution_id, "Succeeded").await;
    assert_eq!(done["awaiting_callback"], false);
    assert!(done["error"].is_null());
    assert_eq!(done["context"]["approval"]["decision"], "Approved");

    promoter.system.shutdown();
}
