use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use flowpilot_cache::FamilyCache;
use flowpilot_core::wire::AuthzRequest;
use flowpilot_delegation::DelegationGraph;
use flowpilot_persona::PersonaRegistry;
use flowpilot_policy::ManifestRegistry;
use serde::Serialize;

use crate::pipeline::Evaluator;
use crate::rule_client::RuleEngineClient;

#[derive(Clone)]
pub struct AppState {
    pub evaluator: Arc<Evaluator>,
    pub manifest_dir: PathBuf,
}

pub struct AppConfig {
    pub listen_addr: String,
    pub delegation_event_path: PathBuf,
    pub persona_event_path: PathBuf,
    pub manifest_dir: PathBuf,
    pub rule_engine_base_url: String,
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
    pub collaborator_refresh_interval: Duration,
}

impl AppConfig {
    /// Reads the service's environment contract (spec §6). `listen_addr`
    /// defaults to `0.0.0.0:8083`; the delegation/persona event paths
    /// default to the same files `flowpilot-delegation`/`flowpilot-persona`
    /// write to, since this service composes C1/C2 in-process rather than
    /// over HTTP (see DESIGN.md).
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_addr = flowpilot_core::env::read_string("FLOWPILOT_AUTHZ_LISTEN_ADDR", Some("0.0.0.0:8083"))?;
        let delegation_event_path = flowpilot_core::env::read_string(
            "FLOWPILOT_DELEGATION_EVENT_PATH",
            Some("state/delegation-events.jsonl"),
        )?
        .into();
        let persona_event_path =
            flowpilot_core::env::read_string("FLOWPILOT_PERSONA_EVENT_PATH", Some("state/persona-events.jsonl"))?
                .into();
        let manifest_dir = flowpilot_core::env::read_string("FLOWPILOT_MANIFEST_DIR", Some("policies"))?.into();
        let rule_engine_base_url =
            flowpilot_core::env::read_string("FLOWPILOT_RULE_ENGINE_URL", Some("http://localhost:9090"))?;
        let request_timeout_ms = flowpilot_core::env::read_u64("FLOWPILOT_REQUEST_TIMEOUT_MS", Some(5_000))?;
        let cache_ttl_secs = flowpilot_core::env::read_u64("FLOWPILOT_CACHE_TTL_SECS", Some(30))?;
        let cache_capacity = flowpilot_core::env::read_u64("FLOWPILOT_CACHE_CAPACITY", Some(10_000))?;
        let collaborator_refresh_interval_ms =
            flowpilot_core::env::read_u64("FLOWPILOT_COLLABORATOR_REFRESH_INTERVAL_MS", Some(2_000))?;

        Ok(Self {
            listen_addr,
            delegation_event_path,
            persona_event_path,
            manifest_dir,
            rule_engine_base_url,
            request_timeout: Duration::from_millis(request_timeout_ms),
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            cache_capacity,
            collaborator_refresh_interval: Duration::from_millis(collaborator_refresh_interval_ms),
        })
    }

    pub fn build_state(&self) -> anyhow::Result<AppState> {
        let delegation = Arc::new(
            DelegationGraph::builder()
                .with_event_path(&self.delegation_event_path)
                .build()?,
        );
        let personas = Arc::new(
            PersonaRegistry::builder()
                .with_event_path(&self.persona_event_path)
                .build()?,
        );
        let manifests = Arc::new(ManifestRegistry::load(&self.manifest_dir)?);
        let rule_engine = RuleEngineClient::new(self.rule_engine_base_url.clone(), self.request_timeout);
        let cache = Arc::new(FamilyCache::new(self.cache_ttl, self.cache_capacity));
        let evaluator = Arc::new(Evaluator::new(manifests, delegation, personas, rule_engine, cache));

        // `delegation-api`/`persona-api` are separate processes writing to
        // the same event logs this process replayed once above; without a
        // periodic re-replay, their later mutations (a revoke, say) would
        // never be observed here (spec §2).
        let refresh_evaluator = Arc::clone(&evaluator);
        let refresh_interval = self.collaborator_refresh_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            ticker.tick().await; // first tick fires immediately; state is already fresh
            loop {
                ticker.tick().await;
                refresh_evaluator.refresh_collaborator_state();
            }
        });

        Ok(AppState {
            evaluator,
            manifest_dir: self.manifest_dir.clone(),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/v1/evaluate", post(evaluate))
        .route("/admin/reload", post(reload_manifests))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ReloadResponse {
    status: &'static str,
    policies: Vec<String>,
}

async fn evaluate(State(state): State<AppState>, Json(request): Json<AuthzRequest>) -> Json<flowpilot_core::wire::AuthzResponse> {
    Json(state.evaluator.evaluate(&request).await)
}

/// `--reload`'s `POST /admin/reload` path (spec §10.3): reparses the
/// manifest directory from disk and swaps it into the running evaluator.
/// A bad manifest directory leaves the previous registry in place.
async fn reload_manifests(State(state): State<AppState>) -> Result<Json<ReloadResponse>, crate::error::ApiError> {
    let manifests = ManifestRegistry::load(&state.manifest_dir)?;
    let policies = manifests.list_names().into_iter().map(str::to_string).collect();
    state.evaluator.reload_manifests(Arc::new(manifests));
    Ok(Json(ReloadResponse {
        status: "reloaded",
        policies,
    }))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
