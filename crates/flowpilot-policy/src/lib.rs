//! Policy Manifest Loader (C3).
//!
//! Parses the per-domain manifests that declare which personas, statuses,
//! and attributes a domain permits, and that name the rule-engine package
//! evaluated for that domain. Loaded once at startup into an in-memory,
//! read-only registry (spec §4.3); readers require no coordination once
//! built (spec §5).

mod error;
mod manifest;
mod registry;

pub use error::ManifestError;
pub use manifest::{Manifest, PersonaConfig, PersonaTitle};
pub use registry::ManifestRegistry;
