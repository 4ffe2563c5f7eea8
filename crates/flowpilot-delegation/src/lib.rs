//! Delegation Graph (C1).
//!
//! Directed, scoped, expiring edges between principals, persisted as an
//! append-only event log and rebuilt into an in-memory graph at startup
//! (spec §4.1, §5). C1 owns edges; it has no notion of a domain's full
//! action set, persona identity, or policy — those are C2/C3/C4's concerns.

pub mod app;
pub mod engine;
pub mod error;
pub mod events;
pub mod store;
pub mod types;

pub use app::{build_router, AppConfig, AppState};
pub use engine::{DelegationEngineBuilder, DelegationGraph};
pub use error::ApiError;
pub use events::{Event, EventEnvelope};
pub use store::EventStore;
pub use types::{ActionScope, DelegationEdge, DelegationEdgeView, DelegationPath, EdgeId, EdgeState};
