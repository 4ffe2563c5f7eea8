use axum::body::Body;
use axum::http::{Request, StatusCode};
use flowpilot_persona::{AppState, PersonaRegistry};
use flowpilot_policy::ManifestRegistry;
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use tower::ServiceExt;

const TRAVEL_MANIFEST: &str = r#"
name: travel
rule_package: auto_book
attributes:
  - name: consent
    type: boolean
    source: persona
    default: false
persona_config:
  persona_titles:
    - title: traveler
      allowed_actions: [read, execute]
  persona_statuses: [active, suspended]
"#;

fn test_state() -> AppState {
    let temp = tempfile::tempdir().unwrap();
    let manifest_dir = temp.path().join("policies");
    fs::create_dir_all(manifest_dir.join("travel")).unwrap();
    fs::write(manifest_dir.join("travel").join("manifest.yaml"), TRAVEL_MANIFEST).unwrap();

    let registry = PersonaRegistry::builder()
        .with_event_path(temp.path().join("events.jsonl"))
        .build()
        .unwrap();
    let manifests = Arc::new(ManifestRegistry::load(&manifest_dir).unwrap());
    AppState { registry, manifests }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_then_get_round_trip() {
    let app = flowpilot_persona::build_router(test_state());
    let payload = json!({
        "policy_hint": "travel",
        "user_sub": "alice",
        "title": "traveler",
        "circle": "family",
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/personas")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let id = created["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/personas/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response).await;
    assert_eq!(fetched["status"], json!("active"));
}

#[tokio::test]
async fn create_with_unknown_title_is_rejected_with_400() {
    let app = flowpilot_persona::build_router(test_state());
    let payload = json!({
        "policy_hint": "travel",
        "user_sub": "alice",
        "title": "ghost",
        "circle": "family",
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/personas")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
