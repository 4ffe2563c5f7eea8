use std::time::Duration;

use flowpilot_core::error::FlowPilotError;
use reqwest::StatusCode;
use serde_json::Value;

use crate::types::{WorkflowItemsResponse, WorkflowMetadata};

/// Client for the domain service (the travel PEP in the reference scenario,
/// but any domain behind the same item-execution contract). Grounded in
/// `ai_agent_core.py`'s `list_workflow_items`/`execute_workflow_item`, which
/// call these same three endpoints over plain HTTP.
#[derive(Debug, Clone)]
pub struct DomainClient {
    client: reqwest::Client,
    base_url: String,
}

/// The outcome of a single item-execution call, before policy-result
/// classification. Transport failures (connection refused, timeout,
/// malformed body) are `Err(FlowPilotError)`; everything the domain service
/// actually answered with — 2xx, 403, or any other status — comes back as
/// `Ok` for the runner to classify, because a 403 here is a normal policy
/// outcome, not a runner failure.
pub struct DomainResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl DomainClient {
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

    pub async fn fetch_workflow(&self, workflow_id: &str) -> Result<WorkflowMetadata, FlowPilotError> {
        let url = format!("{}/v1/workflows/{workflow_id}", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| FlowPilotError::upstream("agent_runner.domain_unreachable", err.to_string()))?;
        if !response.status().is_success() {
            return Err(FlowPilotError::upstream(
                "agent_runner.domain_unreachable",
                format!("workflow lookup returned {}", response.status()),
            ));
        }
        response
            .json()
            .await
            .map_err(|err| FlowPilotError::upstream("agent_runner.domain_unreachable", err.to_string()))
    }

    /// Lists items scoped to the requesting persona. A 403 here means the
    /// whole listing was denied and is surfaced via `DomainResponse`, not an
    /// `Err`, so the caller can record it as the run's `error` rather than a
    /// transport fault.
    pub async fn list_items(
        &self,
        workflow_id: &str,
        persona_title: &str,
        persona_circle: Option<&str>,
    ) -> Result<DomainResponse, FlowPilotError> {
        let url = format!(
            "{}/v1/workflows/{workflow_id}/items",
            self.base_url.trim_end_matches('/')
        );
        let mut query = vec![("persona_title", persona_title.to_string())];
        if let Some(circle) = persona_circle {
            query.push(("persona_circle", circle.to_string()));
        }
        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|err| FlowPilotError::upstream("agent_runner.domain_unreachable", err.to_string()))?;
        let status = response.status();
        let body = read_body_lenient(response).await?;
        Ok(DomainResponse { status, body })
    }

    pub fn parse_items(body: &Value) -> Vec<crate::types::WorkflowItem> {
        serde_json::from_value::<WorkflowItemsResponse>(body.clone())
            .map(|r| r.items)
            .unwrap_or_default()
    }

    pub async fn execute_item(
        &self,
        workflow_id: &str,
        item_id: &str,
        principal_user: &Value,
        dry_run: bool,
    ) -> Result<DomainResponse, FlowPilotError> {
        let url = format!(
            "{}/v1/workflows/{workflow_id}/items/{item_id}/execute",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "principal_user": principal_user, "dry_run": dry_run }))
            .send()
            .await
            .map_err(|err| FlowPilotError::upstream("agent_runner.domain_unreachable", err.to_string()))?;
        let status = response.status();
        let body = read_body_lenient(response).await?;
        Ok(DomainResponse { status, body })
    }
}

/// Domain services aren't guaranteed to answer with JSON on every path (a
/// proxy timeout or a plain-text 403 page are both plausible); fall back to
/// wrapping raw text so the heuristic reason-code scan still has something
/// to scan.
async fn read_body_lenient(response: reqwest::Response) -> Result<Value, FlowPilotError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|err| FlowPilotError::upstream("agent_runner.domain_unreachable", err.to_string()))?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(value) => Ok(value),
        Err(_) => Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned())),
    }
}
