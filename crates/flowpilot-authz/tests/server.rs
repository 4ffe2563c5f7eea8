use std::collections::BTreeSet;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as AxumPath, State as AxumState};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration as ChronoDuration, Utc};
use flowpilot_authz::app::AppState;
use flowpilot_authz::{Evaluator, RuleEngineClient};
use flowpilot_cache::FamilyCache;
use flowpilot_delegation::DelegationGraph;
use flowpilot_persona::{PersonaFields, PersonaRegistry};
use flowpilot_policy::ManifestRegistry;
use serde_json::{json, Value};
use tower::ServiceExt;

const TRAVEL_MANIFEST: &str = r#"
name: travel
rule_package: auto_book
attributes:
  - name: departure_date
    type: date
    source: resource
    required: true
persona_config:
  persona_titles:
    - title: traveler
      allowed_actions: [read, execute]
    - title: travel-agent
      allowed_actions: [read, execute]
      can_be_delegated_to: true
  persona_statuses: [active]
"#;

/// A tiny in-process stand-in for the rule engine (no mockito/wiremock
/// dependency): always returns `allow`, and hands back a call counter so
/// tests can assert it was or wasn't reached.
async fn spawn_mock_rule_engine(allow: bool) -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/v1/data/:package/:rule",
            post(
                move |AxumPath((_package, rule)): AxumPath<(String, String)>,
                      AxumState(calls): AxumState<Arc<AtomicUsize>>,
                      Json(_body): Json<Value>| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        let result = if rule == "allow" {
                            json!(allow)
                        } else {
                            json!(Vec::<String>::new())
                        };
                        Json(json!({ "result": result }))
                    }
                },
            ),
        )
        .with_state(Arc::clone(&calls));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    (format!("http://{addr}"), calls)
}

/// Builds a fresh `AppState` wired to `rule_engine_url`, with a `travel`
/// manifest, a `traveler` persona for U1, and a `travel-agent` persona for
/// U2 already created. The delegation graph starts empty; `seed_delegation`
/// lets a case insert edges before the evaluator is built.
fn test_state(rule_engine_url: &str, seed_delegation: impl FnOnce(&DelegationGraph)) -> AppState {
    let temp = tempfile::tempdir().unwrap();
    let manifest_subdir = temp.path().join("policies").join("travel");
    fs::create_dir_all(&manifest_subdir).unwrap();
    fs::write(manifest_subdir.join("manifest.yaml"), TRAVEL_MANIFEST).unwrap();
    let manifest_dir = temp.path().join("policies");
    let manifests = Arc::new(ManifestRegistry::load(&manifest_dir).unwrap());

    let delegation = DelegationGraph::builder()
        .with_event_path(temp.path().join("delegation.jsonl"))
        .build()
        .unwrap();
    seed_delegation(&delegation);
    let delegation = Arc::new(delegation);

    let personas = Arc::new(
        PersonaRegistry::builder()
            .with_event_path(temp.path().join("persona.jsonl"))
            .build()
            .unwrap(),
    );
    let manifest = manifests.get_by_name("travel").unwrap().clone();
    personas
        .create(
            &manifest,
            "U1",
            "traveler",
            "family",
            PersonaFields {
                status: Some("active".into()),
                ..Default::default()
            },
        )
        .unwrap();
    personas
        .create(
            &manifest,
            "U2",
            "travel-agent",
            "family",
            PersonaFields {
                status: Some("active".into()),
                ..Default::default()
            },
        )
        .unwrap();

    let rule_engine = RuleEngineClient::new(rule_engine_url, Duration::from_secs(2));
    let cache = Arc::new(FamilyCache::new(Duration::from_secs(30), 1000));
    let evaluator = Arc::new(Evaluator::new(manifests, delegation, personas, rule_engine, cache));

    // The event-sourced stores replay from disk only at `build()` time; the
    // temp dir must outlive this `AppState` even though nothing re-reads it.
    std::mem::forget(temp);
    AppState {
        evaluator,
        manifest_dir,
    }
}

fn request_as(principal_persona_title: &str, principal_id: &str) -> Value {
    json!({
        "subject": {"type": "user", "id": principal_id, "properties": {"persona": principal_persona_title}},
        "action": {"name": "execute"},
        "resource": {
            "type": "workflow",
            "id": "W1",
            "properties": {
                "domain": "travel",
                "departure_date": "2026-08-01",
                "owner": {"id": "U1", "persona_title": "traveler", "persona_circle": "family"}
            }
        },
        "context": {"principal": {"id": principal_id, "persona": principal_persona_title}, "policy_hint": "travel"}
    })
}

async fn post_evaluate(app: axum::Router, payload: &Value) -> Value {
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/v1/evaluate")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn s1_direct_execute_is_allowed() {
    let (rule_engine_url, calls) = spawn_mock_rule_engine(true).await;
    let app = flowpilot_authz::build_router(test_state(&rule_engine_url, |_| {}));

    let response = post_evaluate(app, &request_as("traveler", "U1")).await;
    assert_eq!(response["decision"], json!("allow"));
    assert_eq!(response["reason_codes"], json!([]));
    assert_eq!(calls.load(Ordering::SeqCst), 2); // one allow call, one reasons call
}

#[tokio::test]
async fn s5_missing_required_resource_attribute_denies_without_calling_rule_engine() {
    let (rule_engine_url, calls) = spawn_mock_rule_engine(true).await;
    let app = flowpilot_authz::build_router(test_state(&rule_engine_url, |_| {}));

    let mut payload = request_as("traveler", "U1");
    payload["resource"]["properties"].as_object_mut().unwrap().remove("departure_date");

    let response = post_evaluate(app, &payload).await;
    assert_eq!(response["decision"], json!("deny"));
    assert_eq!(response["reason_codes"], json!(["authz.missing_required_attributes"]));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn s2_delegated_execute_is_allowed() {
    let (rule_engine_url, _calls) = spawn_mock_rule_engine(true).await;
    let app = flowpilot_authz::build_router(test_state(&rule_engine_url, |graph| {
        graph
            .insert(
                "U1",
                "U2",
                Utc::now() + ChronoDuration::days(1),
                Some("W1".into()),
                Some(BTreeSet::from(["read".to_string(), "execute".to_string()])),
            )
            .unwrap();
    }));

    let response = post_evaluate(app, &request_as("travel-agent", "U2")).await;
    assert_eq!(response["decision"], json!("allow"));
}

#[tokio::test]
async fn s3_revoked_delegation_denies() {
    let (rule_engine_url, _calls) = spawn_mock_rule_engine(false).await;
    let app = flowpilot_authz::build_router(test_state(&rule_engine_url, |graph| {
        graph
            .insert(
                "U1",
                "U2",
                Utc::now() + ChronoDuration::days(1),
                Some("W1".into()),
                Some(BTreeSet::from(["read".to_string(), "execute".to_string()])),
            )
            .unwrap();
        graph.revoke("U1", "U2", Some("W1")).unwrap();
    }));

    let response = post_evaluate(app, &request_as("travel-agent", "U2")).await;
    assert_eq!(response["decision"], json!("deny"));
}

#[tokio::test]
async fn s4_narrowed_chain_denies_action_outside_intersection() {
    // allow=false stands in for the rule engine rejecting `execute` once it
    // observes delegated_actions=[read] (the engine, not this pipeline,
    // owns that policy judgement; the pipeline's job is only to compute and
    // forward the narrowed intersection, verified directly in
    // `flowpilot_delegation::engine::tests::find_path_intersects_scopes_along_chain`).
    let (rule_engine_url, _calls) = spawn_mock_rule_engine(false).await;
    let app = flowpilot_authz::build_router(test_state(&rule_engine_url, |graph| {
        graph
            .insert(
                "U1",
                "U2",
                Utc::now() + ChronoDuration::days(1),
                Some("W1".into()),
                Some(BTreeSet::from(["read".to_string(), "execute".to_string()])),
            )
            .unwrap();
        graph
            .insert(
                "U2",
                "U3",
                Utc::now() + ChronoDuration::days(1),
                Some("W1".into()),
                Some(BTreeSet::from(["read".to_string()])),
            )
            .unwrap();
    }));

    let response = post_evaluate(app, &request_as("travel-agent", "U3")).await;
    assert_eq!(response["decision"], json!("deny"));
}

#[tokio::test]
async fn s7_admin_reload_picks_up_a_newly_added_manifest() {
    let (rule_engine_url, _calls) = spawn_mock_rule_engine(true).await;
    let state = test_state(&rule_engine_url, |_| {});
    let manifest_dir = state.manifest_dir.clone();

    let nursing_dir = manifest_dir.join("nursing");
    fs::create_dir_all(&nursing_dir).unwrap();
    fs::write(
        nursing_dir.join("manifest.yaml"),
        "name: nursing\nrule_package: care_plan\nattributes: []\n",
    )
    .unwrap();

    let app = flowpilot_authz::build_router(state);
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/admin/reload")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let policies = body["policies"].as_array().unwrap();
    assert!(policies.iter().any(|p| p == "nursing"));
    assert!(policies.iter().any(|p| p == "travel"));
}
