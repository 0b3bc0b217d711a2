//! HTTP surface, exercised through the router without a listener.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use server_core::server::{build_app, AppState};
use tower::ServiceExt;
use uuid::Uuid;

use common::TestHarness;

fn app(harness: &TestHarness) -> Router {
    build_app(AppState {
        dispatcher: harness.dispatcher.clone(),
        posts: harness.posts.clone(),
        db_pool: None,
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();

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

async fn post_with_interview(app: &Router) -> Uuid {
    let post_id = Uuid::new_v4();
    let (status, _) = send(
        app,
        "PUT",
        &format!("/posts/{}/interview", post_id),
        Some(json!({
            "main_keyword": "online marketing",
            "secondary_keywords": ["digital marketing"],
            "language": "es",
            "include_faq": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    post_id
}

#[tokio::test]
async fn health_is_ok() {
    let harness = TestHarness::new();
    let (status, body) = send(&app(&harness), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn enqueue_returns_accepted_and_deduplicates() {
    let harness = TestHarness::new();
    let app = app(&harness);
    let post_id = post_with_interview(&app).await;
    let uri = format!("/posts/{}/generation-jobs", post_id);
    let body = json!({ "content_type": "section", "payload": { "title": "Getting Started" } });

    let (status, first) = send(&app, "POST", &uri, Some(body.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(first["deduplicated"], false);

    let (status, second) = send(&app, "POST", &uri, Some(body)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(second["deduplicated"], true);
    assert_eq!(first["job_id"], second["job_id"]);
    assert_eq!(first["run_id"], second["run_id"]);
}

#[tokio::test]
async fn bad_requests_are_rejected() {
    let harness = TestHarness::new();
    let app = app(&harness);
    let post_id = post_with_interview(&app).await;
    let uri = format!("/posts/{}/generation-jobs", post_id);

    let (status, body) = send(&app, "POST", &uri, Some(json!({ "content_type": "video" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("unknown content type"));

    let (status, _) = send(
        &app,
        "POST",
        &uri,
        Some(json!({ "content_type": "image", "payload": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing was queued, so the post has no run.
    let (status, _) = send(&app, "GET", &format!("/posts/{}/pipeline", post_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_post_is_not_found() {
    let harness = TestHarness::new();
    let app = app(&harness);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/posts/{}/generation-jobs", Uuid::new_v4()),
        Some(json!({ "content_type": "faq" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", &format!("/jobs/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pipeline_and_job_read_models() {
    let harness = TestHarness::new();
    let app = app(&harness);
    let post_id = post_with_interview(&app).await;

    let (_, handle) = send(
        &app,
        "POST",
        &format!("/posts/{}/generation-jobs", post_id),
        Some(json!({ "content_type": "introduction" })),
    )
    .await;

    let (status, pipeline) = send(&app, "GET", &format!("/posts/{}/pipeline", post_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pipeline["status"], "in_progress");
    assert_eq!(pipeline["id"], handle["run_id"]);
    assert_eq!(pipeline["jobs"]["pending"], 1);

    let job_id = handle["job_id"].as_str().unwrap();
    let (status, job) = send(&app, "GET", &format!("/jobs/{}", job_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "pending");
    assert_eq!(job["attempt"], 0);
    assert_eq!(job["job_type"], "introduction");
    assert_eq!(job["post_id"], post_id.to_string());
}

#[tokio::test]
async fn cancel_then_conflict() {
    let harness = TestHarness::new();
    let app = app(&harness);
    let post_id = post_with_interview(&app).await;
    send(
        &app,
        "POST",
        &format!("/posts/{}/generation-jobs", post_id),
        Some(json!({ "content_type": "faq" })),
    )
    .await;

    let cancel = format!("/posts/{}/pipeline/cancel", post_id);
    let (status, run) = send(&app, "POST", &cancel, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "cancelled");

    let (status, _) = send(&app, "POST", &cancel, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn artifacts_are_listed_after_the_worker_runs() {
    let harness = TestHarness::new();
    let app = app(&harness);
    let post_id = post_with_interview(&app).await;
    send(
        &app,
        "POST",
        &format!("/posts/{}/generation-jobs", post_id),
        Some(json!({ "content_type": "faq" })),
    )
    .await;

    harness.drain(research::PostId::from_uuid(post_id)).await;

    let (status, artifacts) = send(&app, "GET", &format!("/posts/{}/artifacts", post_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(artifacts.as_array().unwrap().len(), 1);
    assert_eq!(artifacts[0]["key"], "faq");
    assert_eq!(artifacts[0]["content_type"], "faq");

    let (_, pipeline) = send(&app, "GET", &format!("/posts/{}/pipeline", post_id), None).await;
    assert_eq!(pipeline["status"], "completed");
    assert_eq!(pipeline["progress"], 100);
}
