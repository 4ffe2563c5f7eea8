//! Persona Registry (C2).
//!
//! A user's manifest-validated role-bundles under one domain, keyed by
//! `(user_sub, title, circle)` (spec §3, §4.2). Validation is schema-driven
//! from the selected `flowpilot_policy::Manifest`; adding a policy attribute
//! to a manifest flows through create/update with no code change here.

pub mod app;
pub mod engine;
pub mod error;
pub mod events;
pub mod store;
pub mod types;

pub use app::{build_router, AppConfig, AppState};
pub use engine::{PersonaEngineBuilder, PersonaFields, PersonaRegistry};
pub use error::ApiError;
pub use events::{Event, EventEnvelope};
pub use store::EventStore;
pub use types::{persona_id, Persona};
