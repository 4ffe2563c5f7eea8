//! Authorization Engine (C4).
//!
//! The AuthZEN-shaped policy decision point: selects a manifest, validates
//! and enriches the subject/action/resource/context, and asks the external
//! rule engine for the final verdict. Composes the Delegation Graph (C1)
//! and Persona Registry (C2) as in-process reads rather than as HTTP
//! peers — all five FlowPilot components share one workspace, and only the
//! rule engine is a genuinely external collaborator (spec §4.4, §6).

pub mod app;
pub mod error;
pub mod pipeline;
pub mod rule_client;
pub mod types;

pub use app::{build_router, AppConfig, AppState};
pub use error::ApiError;
pub use pipeline::Evaluator;
pub use rule_client::RuleEngineClient;
