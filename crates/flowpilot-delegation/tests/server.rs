use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use flowpilot_delegation::{AppState, DelegationGraph};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_state() -> AppState {
    let temp = tempfile::tempdir().unwrap();
    let graph = DelegationGraph::builder()
        .with_event_path(temp.path().join("events.jsonl"))
        .build()
        .unwrap();
    AppState { graph }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check_reports_ok() {
    let app = flowpilot_delegation::build_router(test_state());
    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn insert_then_find_path_round_trip() {
    let app = flowpilot_delegation::build_router(test_state());
    let expires_at = Utc::now() + Duration::hours(1);
    let payload = json!({
        "principal_id": "alice",
        "delegate_id": "bob",
        "expires_at": expires_at,
        "workflow_id": null,
        "scope": ["read", "execute"],
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/edges")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["was_created"], json!(true));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/edges/find-path?principal_id=alice&delegate_id=bob")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["path"], json!(["alice", "bob"]));
}

#[tokio::test]
async fn self_delegation_is_rejected_with_400() {
    let app = flowpilot_delegation::build_router(test_state());
    let expires_at = Utc::now() + Duration::hours(1);
    let payload = json!({
        "principal_id": "alice",
        "delegate_id": "alice",
        "expires_at": expires_at,
        "workflow_id": null,
        "scope": null,
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/edges")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
