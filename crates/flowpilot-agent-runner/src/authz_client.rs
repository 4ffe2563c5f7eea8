use std::time::Duration;

use flowpilot_core::error::FlowPilotError;
use flowpilot_core::wire::{AuthzRequest, AuthzResponse};

/// Client for the Authorization Engine's `POST /v1/evaluate` (spec §6).
/// Unlike the Authorization Engine's own in-process composition of the
/// Delegation Graph and Persona Registry, the Agent Runner is a separate
/// deployable and reaches the Authorization Engine strictly over HTTP — the
/// same shape as `ai_agent_core.py`'s `_call_authz_for_workflow`.
#[derive(Debug, Clone)]
pub struct AuthzClient {
    client: reqwest::Client,
    base_url: String,
}

impl AuthzClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub async fn evaluate(&self, request: &AuthzRequest) -> Result<AuthzResponse, FlowPilotError> {
        let url = format!("{}/v1/evaluate", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|err| FlowPilotError::upstream("agent_runner.authz_unreachable", err.to_string()))?;
        if !response.status().is_success() {
            return Err(FlowPilotError::upstream(
                "agent_runner.authz_unreachable",
                format!("authorization engine returned {}", response.status()),
            ));
        }
        response
            .json()
            .await
            .map_err(|err| FlowPilotError::upstream("agent_runner.authz_unreachable", err.to_string()))
    }
}
