use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use crate::authz_client::AuthzClient;
use crate::domain_client::DomainClient;
use crate::error::ApiError;
use crate::runner::Runner;
use crate::types::{PrincipalUser, RunRecord};

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<Runner>,
}

pub struct AppConfig {
    pub listen_addr: String,
    pub domain_base_url: String,
    pub authz_base_url: String,
    pub agent_sub: String,
    pub request_timeout: Duration,
}

impl AppConfig {
    /// Reads the service's environment contract (spec §6). Both
    /// collaborators are reached over HTTP since this service, unlike
    /// `flowpilot-authz`, is a standalone deployable (see DESIGN.md).
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_addr =
            flowpilot_core::env::read_string("FLOWPILOT_AGENT_RUNNER_LISTEN_ADDR", Some("0.0.0.0:8084"))?;
        let domain_base_url =
            flowpilot_core::env::read_string("FLOWPILOT_DOMAIN_SERVICE_URL", Some("http://localhost:9091"))?;
        let authz_base_url = flowpilot_core::env::read_string("FLOWPILOT_AUTHZ_URL", Some("http://localhost:8083"))?;
        let agent_sub = flowpilot_core::env::read_string("FLOWPILOT_AGENT_SUB", Some("agent-runner"))?;
        let request_timeout_ms = flowpilot_core::env::read_u64("FLOWPILOT_REQUEST_TIMEOUT_MS", Some(10_000))?;

        Ok(Self {
            listen_addr,
            domain_base_url,
            authz_base_url,
            agent_sub,
            request_timeout: Duration::from_millis(request_timeout_ms),
        })
    }

    pub fn build_state(&self) -> anyhow::Result<AppState> {
        let domain = DomainClient::new(self.domain_base_url.clone(), self.request_timeout);
        let authz = AuthzClient::new(self.authz_base_url.clone(), self.request_timeout);
        let runner = Arc::new(Runner::new(domain, authz, self.agent_sub.clone()));
        Ok(AppState { runner })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/v1/workflows/:workflow_id/run", post(run_workflow))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, serde::Deserialize)]
struct RunWorkflowRequest {
    principal: PrincipalUser,
    #[serde(default)]
    dry_run: bool,
}

async fn run_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Json(request): Json<RunWorkflowRequest>,
) -> Result<Json<RunRecord>, ApiError> {
    let run_id = format!("wr_{}", Uuid::new_v4().simple());
    let record = state
        .runner
        .run(run_id, &workflow_id, request.principal, request.dry_run)
        .await?;
    Ok(Json(record))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
