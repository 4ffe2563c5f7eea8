use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as AxumPath, Query, State as AxumState};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use flowpilot_agent_runner::{AuthzClient, DomainClient, Runner};
use flowpilot_agent_runner::types::PrincipalUser;
use serde_json::{json, Value};

/// Spawns an in-process stand-in for the domain service. `I2` always comes
/// back `403` with a structured deny body; every other item id is `200`.
async fn spawn_mock_domain() -> String {
    #[derive(Clone)]
    struct Fixture;

    async fn get_workflow(AxumPath(workflow_id): AxumPath<String>) -> Json<Value> {
        Json(json!({
            "workflow_id": workflow_id,
            "domain": "travel",
            "owner_sub": "U1",
            "owner_persona_title": "traveler",
            "owner_persona_circle": "family",
            "departure_date": "2026-08-01",
        }))
    }

    async fn list_items(
        AxumPath(_workflow_id): AxumPath<String>,
        Query(_params): Query<BTreeMap<String, String>>,
    ) -> Json<Value> {
        Json(json!({
            "items": [
                {"item_id": "I1", "kind": "flight"},
                {"item_id": "I2", "kind": "hotel"},
            ]
        }))
    }

    async fn execute_item(
        AxumPath((_workflow_id, item_id)): AxumPath<(String, String)>,
        Json(_body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if item_id == "I2" {
            (
                StatusCode::FORBIDDEN,
                Json(json!({"detail": {"reason_codes": ["price_over_cap"], "advice": []}})),
            )
        } else {
            (StatusCode::OK, Json(json!({"status": "booked"})))
        }
    }

    let app = Router::new()
        .route("/v1/workflows/:workflow_id", get(get_workflow))
        .route("/v1/workflows/:workflow_id/items", get(list_items))
        .route("/v1/workflows/:workflow_id/items/:item_id/execute", post(execute_item))
        .with_state(Fixture);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    format!("http://{addr}")
}

/// Spawns an in-process stand-in for the authorization engine: always
/// allows whatever it's asked, mirroring the pre-flight check passing so
/// the test exercises per-item domain-side policy outcomes instead.
async fn spawn_mock_authz() -> String {
    async fn evaluate(Json(_req): Json<Value>) -> Json<Value> {
        Json(json!({"decision": "allow", "reason_codes": [], "advice": []}))
    }

    let app = Router::new().route("/v1/evaluate", post(evaluate));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    format!("http://{addr}")
}

async fn spawn_mock_authz_deny(reason: &'static str) -> String {
    async fn evaluate(Json(_req): Json<Value>) -> Json<Value> {
        Json(json!({"decision": "deny", "reason_codes": [reason], "advice": []}))
    }

    let app = Router::new().route("/v1/evaluate", post(evaluate));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    format!("http://{addr}")
}

fn principal() -> PrincipalUser {
    PrincipalUser {
        id: "agent-for-U1".to_string(),
        persona_title: "travel-agent".to_string(),
        persona_circle: Some("family".to_string()),
    }
}

#[tokio::test]
async fn s6_mixed_item_outcomes_complete_the_run_without_an_error() {
    let domain_url = spawn_mock_domain().await;
    let authz_url = spawn_mock_authz().await;
    let domain = DomainClient::new(domain_url, Duration::from_secs(2));
    let authz = AuthzClient::new(authz_url, Duration::from_secs(2));
    let runner = Runner::new(domain, authz, "agent-runner");

    let record = runner
        .run("wr_test".to_string(), "W1", principal(), false)
        .await
        .unwrap();

    assert!(record.error.is_none());
    assert_eq!(record.results.len(), 2);

    let i1 = record.results.iter().find(|r| r.item_id == "I1").unwrap();
    assert_eq!(i1.status, flowpilot_agent_runner::types::ItemStatus::Completed);
    assert_eq!(i1.decision, flowpilot_agent_runner::types::ItemDecision::Allow);
    assert!(i1.reason_codes.is_empty());

    let i2 = record.results.iter().find(|r| r.item_id == "I2").unwrap();
    assert_eq!(i2.status, flowpilot_agent_runner::types::ItemStatus::Completed);
    assert_eq!(i2.decision, flowpilot_agent_runner::types::ItemDecision::Deny);
    assert_eq!(i2.reason_codes, vec!["price_over_cap".to_string()]);
}

#[tokio::test]
async fn preflight_deny_short_circuits_with_empty_results_and_an_error() {
    let domain_url = spawn_mock_domain().await;
    let authz_url = spawn_mock_authz_deny("workflow_execute_denied").await;
    let domain = DomainClient::new(domain_url, Duration::from_secs(2));
    let authz = AuthzClient::new(authz_url, Duration::from_secs(2));
    let runner = Runner::new(domain, authz, "agent-runner");

    let record = runner
        .run("wr_test".to_string(), "W1", principal(), false)
        .await
        .unwrap();

    assert!(record.results.is_empty());
    let error = record.error.unwrap();
    assert_eq!(error.reason_codes, vec!["workflow_execute_denied".to_string()]);
}
