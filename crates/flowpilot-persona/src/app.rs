use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use flowpilot_policy::ManifestRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::engine::{PersonaFields, PersonaRegistry};
use crate::error::ApiError;
use crate::types::Persona;

#[derive(Clone)]
pub struct AppState {
    pub registry: PersonaRegistry,
    pub manifests: Arc<ManifestRegistry>,
}

pub struct AppConfig {
    pub listen_addr: String,
    pub event_path: PathBuf,
    pub manifest_dir: PathBuf,
    pub max_personas_per_user: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_addr = flowpilot_core::env::read_string("FLOWPILOT_PERSONA_LISTEN_ADDR", Some("0.0.0.0:8082"))?;
        let event_path =
            flowpilot_core::env::read_string("FLOWPILOT_PERSONA_EVENT_PATH", Some("state/persona-events.jsonl"))?
                .into();
        let manifest_dir = flowpilot_core::env::read_string("FLOWPILOT_MANIFEST_DIR", Some("policies"))?.into();
        let max_personas_per_user = flowpilot_core::env::read_usize(
            "FLOWPILOT_MAX_PERSONAS_PER_USER",
            Some(crate::engine::DEFAULT_MAX_PERSONAS_PER_USER),
        )?;
        Ok(Self {
            listen_addr,
            event_path,
            manifest_dir,
            max_personas_per_user,
        })
    }

    pub fn build_state(&self) -> anyhow::Result<AppState> {
        let registry = PersonaRegistry::builder()
            .with_event_path(&self.event_path)
            .with_max_personas_per_user(self.max_personas_per_user)
            .build()?;
        let manifests = Arc::new(ManifestRegistry::load(&self.manifest_dir)?);
        Ok(AppState { registry, manifests })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/v1/personas", post(create_persona))
        .route("/v1/personas/:id", get(get_persona).patch(update_persona).delete(delete_persona))
        .route("/v1/users/:user_sub/personas", get(list_personas))
        .route("/v1/personas/by-title/:title", get(list_by_title))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PersonaFieldsPayload {
    #[serde(default)]
    scope: Option<BTreeSet<String>>,
    #[serde(default)]
    valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    valid_till: Option<DateTime<Utc>>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
}

impl From<PersonaFieldsPayload> for PersonaFields {
    fn from(p: PersonaFieldsPayload) -> Self {
        PersonaFields {
            scope: p.scope,
            valid_from: p.valid_from,
            valid_till: p.valid_till,
            status: p.status,
            attributes: p.attributes,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatePersonaRequest {
    policy_hint: String,
    user_sub: String,
    title: String,
    circle: String,
    #[serde(flatten)]
    fields: PersonaFieldsPayload,
}

#[derive(Debug, Deserialize)]
struct UpdatePersonaRequest {
    policy_hint: String,
    #[serde(flatten)]
    fields: PersonaFieldsPayload,
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    status: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn create_persona(
    State(state): State<AppState>,
    Json(payload): Json<CreatePersonaRequest>,
) -> Result<Json<Persona>, ApiError> {
    let manifest = state.manifests.select(Some(&payload.policy_hint))?;
    let persona = state.registry.create(
        manifest,
        &payload.user_sub,
        &payload.title,
        &payload.circle,
        payload.fields.into(),
    )?;
    Ok(Json(persona))
}

async fn get_persona(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Persona>, ApiError> {
    state
        .registry
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError(flowpilot_core::error::FlowPilotError::not_found(
            "persona.not_found",
            format!("persona '{id}' not found"),
        )))
}

async fn update_persona(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePersonaRequest>,
) -> Result<Json<Persona>, ApiError> {
    let manifest = state.manifests.select(Some(&payload.policy_hint))?;
    let persona = state.registry.update(manifest, &id, payload.fields.into())?;
    Ok(Json(persona))
}

async fn delete_persona(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<bool>, ApiError> {
    Ok(Json(state.registry.delete(&id)?))
}

async fn list_personas(
    State(state): State<AppState>,
    Path(user_sub): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Json<Vec<Persona>> {
    Json(state.registry.list(&user_sub, query.status.as_deref()))
}

async fn list_by_title(
    State(state): State<AppState>,
    Path(title): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Json<Vec<Persona>> {
    Json(state.registry.list_by_title(&title, query.status.as_deref()))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
