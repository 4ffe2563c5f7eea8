use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use flowpilot_core::error::FlowPilotError;
use flowpilot_core::normalize::{self, AttributeSource};
use flowpilot_policy::Manifest;
use parking_lot::RwLock;
use serde_json::Value;

use crate::events::{Event, EventEnvelope};
use crate::store::{EventStore, StoreError};
use crate::types::{persona_id, Persona};

/// Default cap on personas per user (spec §3 `MAX_PERSONAS_PER_USER`); the
/// spec names the invariant but leaves the number to the implementation.
pub const DEFAULT_MAX_PERSONAS_PER_USER: usize = 20;

const DEFAULT_VALIDITY_DAYS: i64 = 365;

fn storage(err: StoreError) -> FlowPilotError {
    FlowPilotError::storage(err.to_string())
}

#[derive(Debug, Clone)]
pub struct PersonaEngineBuilder {
    event_path: PathBuf,
    max_personas_per_user: usize,
}

impl Default for PersonaEngineBuilder {
    fn default() -> Self {
        Self {
            event_path: PathBuf::from("state/persona-events.jsonl"),
            max_personas_per_user: DEFAULT_MAX_PERSONAS_PER_USER,
        }
    }
}

impl PersonaEngineBuilder {
    #[must_use]
    pub fn with_event_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.event_path = path.as_ref().to_path_buf();
        self
    }

    #[must_use]
    pub fn with_max_personas_per_user(mut self, max: usize) -> Self {
        self.max_personas_per_user = max;
        self
    }

    pub fn build(self) -> Result<PersonaRegistry, FlowPilotError> {
        let event_store = Arc::new(EventStore::open(&self.event_path).map_err(storage)?);
        let mut state = HashMap::new();
        let events = event_store.load().map_err(storage)?;
        for envelope in events {
            apply_event(&mut state, &envelope.event);
        }
        Ok(PersonaRegistry {
            event_store,
            state: Arc::new(RwLock::new(state)),
            max_personas_per_user: self.max_personas_per_user,
        })
    }
}

/// Fields a caller may set on create/update; `None` means "use the
/// manifest/registry default on create" or "leave untouched on update"
/// (spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct PersonaFields {
    pub scope: Option<BTreeSet<String>>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_till: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub attributes: BTreeMap<String, Value>,
}

/// The Persona Registry (C2): a user's manifest-validated role-bundles,
/// keyed by `(user_sub, title, circle)` (spec §4.2).
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    event_store: Arc<EventStore>,
    state: Arc<RwLock<HashMap<String, Persona>>>,
    max_personas_per_user: usize,
}

impl PersonaRegistry {
    #[must_use]
    pub fn builder() -> PersonaEngineBuilder {
        PersonaEngineBuilder::default()
    }

    pub fn create(
        &self,
        manifest: &Manifest,
        user_sub: &str,
        title: &str,
        circle: &str,
        fields: PersonaFields,
    ) -> Result<Persona, FlowPilotError> {
        let id = persona_id(user_sub, title, circle);
        let mut state = self.state.write();
        if state.contains_key(&id) {
            return Err(FlowPilotError::new(
                flowpilot_core::error::ErrorKind::InvalidArgument,
                "persona.already_exists",
                format!("persona '{id}' already exists; use update instead"),
            ));
        }
        let existing_count = state.values().filter(|p| p.user_sub == user_sub).count();
        if existing_count >= self.max_personas_per_user {
            return Err(FlowPilotError::invalid_argument(
                "persona.cap_exceeded",
                format!(
                    "user '{user_sub}' already holds {existing_count} personas (max {})",
                    self.max_personas_per_user
                ),
            ));
        }

        validate_title_and_status(manifest, title, fields.status.as_deref())?;

        let now = Utc::now();
        let scope = fields
            .scope
            .unwrap_or_else(|| BTreeSet::from(["read".to_string(), "execute".to_string()]));
        let valid_from = fields.valid_from.unwrap_or(now);
        let valid_till = fields
            .valid_till
            .unwrap_or_else(|| now + Duration::days(DEFAULT_VALIDITY_DAYS));
        let status = fields.status.unwrap_or_else(|| "active".to_string());
        let attributes = normalize::normalize(
            &fields.attributes,
            &manifest.attributes,
            AttributeSource::Persona,
        )?;

        let persona = Persona {
            id: id.clone(),
            user_sub: user_sub.to_string(),
            title: title.to_string(),
            circle: circle.to_string(),
            scope: scope.clone(),
            valid_from,
            valid_till,
            status: status.clone(),
            created_at: now,
            updated_at: now,
            attributes: attributes.clone(),
        };
        let envelope = EventEnvelope::new(Event::PersonaCreated {
            id: id.clone(),
            user_sub: user_sub.to_string(),
            title: title.to_string(),
            circle: circle.to_string(),
            scope,
            valid_from,
            valid_till,
            status,
            created_at: now,
            attributes,
        });
        self.event_store.append(&envelope).map_err(storage)?;
        state.insert(id.clone(), persona.clone());
        tracing::info!(persona_id = %id, %user_sub, %title, "persona created");
        Ok(persona)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Persona> {
        self.state.read().get(id).cloned()
    }

    #[must_use]
    pub fn list(&self, user_sub: &str, status: Option<&str>) -> Vec<Persona> {
        let state = self.state.read();
        let mut personas: Vec<Persona> = state
            .values()
            .filter(|p| p.user_sub == user_sub)
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        personas.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        personas
    }

    #[must_use]
    pub fn list_by_title(&self, title: &str, status: Option<&str>) -> Vec<Persona> {
        let state = self.state.read();
        let mut personas: Vec<Persona> = state
            .values()
            .filter(|p| p.title == title)
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        personas.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        personas
    }

    pub fn update(
        &self,
        manifest: &Manifest,
        id: &str,
        fields: PersonaFields,
    ) -> Result<Persona, FlowPilotError> {
        let mut state = self.state.write();
        let current = state
            .get(id)
            .cloned()
            .ok_or_else(|| FlowPilotError::not_found("persona.not_found", format!("persona '{id}' not found")))?;

        validate_title_and_status(manifest, &current.title, fields.status.as_deref())?;

        let scope = fields.scope.unwrap_or_else(|| current.scope.clone());
        let valid_from = fields.valid_from.unwrap_or(current.valid_from);
        let valid_till = fields.valid_till.unwrap_or(current.valid_till);
        let status = fields.status.unwrap_or_else(|| current.status.clone());

        let mut merged_raw: BTreeMap<String, Value> = current
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        merged_raw.extend(fields.attributes);
        let attributes =
            normalize::normalize(&merged_raw, &manifest.attributes, AttributeSource::Persona)?;

        let now = Utc::now();
        let updated = Persona {
            scope: scope.clone(),
            valid_from,
            valid_till,
            status: status.clone(),
            updated_at: now,
            attributes: attributes.clone(),
            ..current
        };
        let envelope = EventEnvelope::new(Event::PersonaUpdated {
            id: id.to_string(),
            scope,
            valid_from,
            valid_till,
            status,
            updated_at: now,
            attributes,
        });
        self.event_store.append(&envelope).map_err(storage)?;
        state.insert(id.to_string(), updated.clone());
        tracing::info!(persona_id = %id, "persona updated");
        Ok(updated)
    }

    pub fn delete(&self, id: &str) -> Result<bool, FlowPilotError> {
        let mut state = self.state.write();
        if state.remove(id).is_none() {
            return Ok(false);
        }
        let envelope = EventEnvelope::new(Event::PersonaDeleted { id: id.to_string() });
        self.event_store.append(&envelope).map_err(storage)?;
        tracing::info!(persona_id = %id, "persona deleted");
        Ok(true)
    }

    /// Re-replays the event log from disk and replaces in-memory state
    /// wholesale, so a process that only reads this registry (the
    /// Authorization Engine) observes mutations an owning `persona-api`
    /// process makes, without restarting (spec §2).
    pub fn reload(&self) -> Result<(), FlowPilotError> {
        let events = self.event_store.load().map_err(storage)?;
        let mut state = HashMap::new();
        for envelope in events {
            apply_event(&mut state, &envelope.event);
        }
        *self.state.write() = state;
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Persona> {
        let state = self.state.read();
        let mut personas: Vec<Persona> = state.values().cloned().collect();
        personas.sort_by(|a, b| a.id.cmp(&b.id));
        personas
    }

    #[must_use]
    pub fn event_store(&self) -> Arc<EventStore> {
        Arc::clone(&self.event_store)
    }

    #[must_use]
    pub fn replay_snapshot(events: &[EventEnvelope]) -> Vec<Persona> {
        let mut state = HashMap::new();
        for envelope in events {
            apply_event(&mut state, &envelope.event);
        }
        let mut personas: Vec<Persona> = state.values().cloned().collect();
        personas.sort_by(|a, b| a.id.cmp(&b.id));
        personas
    }
}

fn validate_title_and_status(
    manifest: &Manifest,
    title: &str,
    status: Option<&str>,
) -> Result<(), FlowPilotError> {
    if !manifest.persona_config.allowed_titles().contains(&title) {
        return Err(FlowPilotError::invalid_argument(
            "persona.invalid_title",
            format!("title '{title}' is not permitted by manifest '{}'", manifest.name),
        ));
    }
    if let Some(status) = status {
        if !manifest
            .persona_config
            .persona_statuses
            .iter()
            .any(|s| s == status)
        {
            return Err(FlowPilotError::invalid_argument(
                "persona.invalid_status",
                format!("status '{status}' is not permitted by manifest '{}'", manifest.name),
            ));
        }
    }
    Ok(())
}

fn apply_event(state: &mut HashMap<String, Persona>, event: &Event) {
    match event {
        Event::PersonaCreated {
            id,
            user_sub,
            title,
            circle,
            scope,
            valid_from,
            valid_till,
            status,
            created_at,
            attributes,
        } => {
            state.insert(
                id.clone(),
                Persona {
                    id: id.clone(),
                    user_sub: user_sub.clone(),
                    title: title.clone(),
                    circle: circle.clone(),
                    scope: scope.clone(),
                    valid_from: *valid_from,
                    valid_till: *valid_till,
                    status: status.clone(),
                    created_at: *created_at,
                    updated_at: *created_at,
                    attributes: attributes.clone(),
                },
            );
        }
        Event::PersonaUpdated {
            id,
            scope,
            valid_from,
            valid_till,
            status,
            updated_at,
            attributes,
        } => {
            if let Some(persona) = state.get_mut(id) {
                persona.scope = scope.clone();
                persona.valid_from = *valid_from;
                persona.valid_till = *valid_till;
                persona.status = status.clone();
                persona.updated_at = *updated_at;
                persona.attributes = attributes.clone();
            }
        }
        Event::PersonaDeleted { id } => {
            state.remove(id);
        }
    }
}
