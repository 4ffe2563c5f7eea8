//! Shared types for the FlowPilot authorization platform: the AuthZEN wire
//! shapes, the stable error taxonomy, schema-driven attribute normalization,
//! and small environment-variable helpers reused by every service.

pub mod env;
pub mod error;
pub mod normalize;
pub mod wire;

pub use error::{ErrorKind, FlowPilotError};
pub use normalize::{normalize, AttributeSchema, AttributeSource, AttributeType, NormalizedValue};
pub use wire::{
    Action, AuthzDecision, AuthzRequest, AuthzResponse, Context, Options, Resource, Subject,
};
