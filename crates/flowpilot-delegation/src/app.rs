use std::path::PathBuf;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::engine::DelegationGraph;
use crate::error::ApiError;
use crate::types::{ActionScope, DelegationEdge, DelegationEdgeView, DelegationPath};
use flowpilot_core::error::FlowPilotError;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct AppState {
    pub graph: DelegationGraph,
}

pub struct AppConfig {
    pub listen_addr: String,
    pub event_path: PathBuf,
}

impl AppConfig {
    /// Reads `FLOWPILOT_DELEGATION_LISTEN_ADDR` and
    /// `FLOWPILOT_DELEGATION_EVENT_PATH`, falling back to sane defaults
    /// (grounded in `services/kkp/src/app.rs`'s `AppConfig::from_env`).
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_addr = flowpilot_core::env::read_string("FLOWPILOT_DELEGATION_LISTEN_ADDR", Some("0.0.0.0:8081"))?;
        let event_path = flowpilot_core::env::read_string(
            "FLOWPILOT_DELEGATION_EVENT_PATH",
            Some("state/delegation-events.jsonl"),
        )?
        .into();
        Ok(Self {
            listen_addr,
            event_path,
        })
    }

    pub fn build_state(&self) -> anyhow::Result<AppState> {
        let graph = DelegationGraph::builder()
            .with_event_path(&self.event_path)
            .build()?;
        Ok(AppState { graph })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/v1/edges", post(insert_edge))
        .route("/v1/edges/revoke", post(revoke_edge))
        .route("/v1/edges/outgoing/:principal_id", get(list_outgoing))
        .route("/v1/edges/incoming/:delegate_id", get(list_incoming))
        .route("/v1/edges/find-path", get(find_path))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct InsertRequest {
    principal_id: String,
    delegate_id: String,
    expires_at: DateTime<Utc>,
    workflow_id: Option<String>,
    scope: Option<BTreeSet<String>>,
    /// Who is making this request. Defaults to `principal_id` (the common
    /// case: a principal delegating their own access). When it names
    /// someone else, that caller must already hold a live delegated path
    /// from `principal_id` whose actions are a superset of `scope`
    /// (`delegation_core.py::create_delegation`'s non-owner check).
    caller_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct InsertResponse {
    edge: DelegationEdge,
    was_created: bool,
}

#[derive(Debug, Deserialize)]
struct RevokeRequest {
    principal_id: String,
    delegate_id: String,
    workflow_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    workflow_id: Option<String>,
    #[serde(default)]
    include_expired: bool,
}

#[derive(Debug, Deserialize)]
struct FindPathQuery {
    principal_id: String,
    delegate_id: String,
    workflow_id: Option<String>,
    max_depth: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn insert_edge(
    State(state): State<AppState>,
    Json(payload): Json<InsertRequest>,
) -> Result<Json<InsertResponse>, ApiError> {
    let caller_id = payload.caller_id.as_deref().unwrap_or(&payload.principal_id);
    if caller_id != payload.principal_id {
        authorize_delegator(&state.graph, &payload.principal_id, caller_id, payload.scope.as_ref())?;
    }

    let (edge, was_created) = state.graph.insert(
        &payload.principal_id,
        &payload.delegate_id,
        payload.expires_at,
        payload.workflow_id,
        payload.scope,
    )?;
    Ok(Json(InsertResponse { edge, was_created }))
}

/// Rejects the create unless `caller_id` already holds a live delegated
/// path from `principal_id` whose action set is a superset of `scope`
/// (the non-owner delegation-creation check from
/// `delegation_core.py::create_delegation`, supplementing the bare
/// merge-on-conflict semantics of a same-principal `insert`).
fn authorize_delegator(
    graph: &DelegationGraph,
    principal_id: &str,
    caller_id: &str,
    scope: Option<&BTreeSet<String>>,
) -> Result<(), FlowPilotError> {
    let path = graph
        .find_path(principal_id, caller_id, None, None)
        .ok_or_else(|| {
            FlowPilotError::invalid_argument(
                "delegation.unauthorized_delegator",
                format!("{caller_id} has no live delegated path from {principal_id}"),
            )
        })?;

    let requested = scope.cloned().unwrap_or_else(|| BTreeSet::from(["read".to_string(), "execute".to_string()]));
    let has_superset = match path.delegated_actions {
        ActionScope::Unrestricted => true,
        ActionScope::Restricted(ref held) => requested.is_subset(held),
    };
    if !has_superset {
        return Err(FlowPilotError::invalid_argument(
            "delegation.unauthorized_delegator",
            format!("{caller_id}'s delegated path from {principal_id} does not cover the requested scope"),
        ));
    }
    Ok(())
}

async fn revoke_edge(
    State(state): State<AppState>,
    Json(payload): Json<RevokeRequest>,
) -> Result<Json<bool>, ApiError> {
    let revoked = state.graph.revoke(
        &payload.principal_id,
        &payload.delegate_id,
        payload.workflow_id.as_deref(),
    )?;
    Ok(Json(revoked))
}

async fn list_outgoing(
    State(state): State<AppState>,
    axum::extract::Path(principal_id): axum::extract::Path<String>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<DelegationEdgeView>> {
    let now = Utc::now();
    Json(
        state
            .graph
            .list_outgoing(&principal_id, query.workflow_id.as_deref(), query.include_expired)
            .into_iter()
            .map(|edge| DelegationEdgeView::new(edge, now))
            .collect(),
    )
}

async fn list_incoming(
    State(state): State<AppState>,
    axum::extract::Path(delegate_id): axum::extract::Path<String>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<DelegationEdgeView>> {
    let now = Utc::now();
    Json(
        state
            .graph
            .list_incoming(&delegate_id, query.workflow_id.as_deref(), query.include_expired)
            .into_iter()
            .map(|edge| DelegationEdgeView::new(edge, now))
            .collect(),
    )
}

async fn find_path(
    State(state): State<AppState>,
    Query(query): Query<FindPathQuery>,
) -> Json<Option<DelegationPath>> {
    Json(state.graph.find_path(
        &query.principal_id,
        &query.delegate_id,
        query.workflow_id.as_deref(),
        query.max_depth,
    ))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
