use std::time::Duration;

use flowpilot_core::error::FlowPilotError;
use serde_json::Value;

/// Client for the external Rule Engine (spec §6): `POST
/// /v1/data/{package}/{rule}` with `{input: <object>}`, returning `{result:
/// <value>}`. Grounded in `rust/summit/src/serialization/schema_registry.rs`'s
/// `{client, base_url}` wrapper around `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct RuleEngineClient {
    client: reqwest::Client,
    base_url: String,
}

impl RuleEngineClient {
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

    async fn evaluate_rule(&self, package: &str, rule: &str, input: &Value) -> Result<Value, FlowPilotError> {
        let url = format!("{}/v1/data/{package}/{rule}", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await
            .map_err(|err| FlowPilotError::upstream("authz.rule_engine_unreachable", err.to_string()))?;
        if !response.status().is_success() {
            return Err(FlowPilotError::upstream(
                "authz.rule_engine_unreachable",
                format!("rule engine returned {}", response.status()),
            ));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|err| FlowPilotError::upstream("authz.rule_engine_unreachable", err.to_string()))?;
        body.get("result")
            .cloned()
            .ok_or_else(|| FlowPilotError::upstream("authz.rule_engine_unreachable", "missing 'result' field"))
    }

    /// `<package>/allow -> bool`.
    pub async fn allow(&self, package: &str, input: &Value) -> Result<bool, FlowPilotError> {
        let result = self.evaluate_rule(package, "allow", input).await?;
        result
            .as_bool()
            .ok_or_else(|| FlowPilotError::upstream("authz.rule_engine_unreachable", "'allow' result was not a bool"))
    }

    /// `<package>/reasons -> list<string>`.
    pub async fn reasons(&self, package: &str, input: &Value) -> Result<Vec<String>, FlowPilotError> {
        let result = self.evaluate_rule(package, "reasons", input).await?;
        match result {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()),
            Value::Null => Ok(Vec::new()),
            _ => Err(FlowPilotError::upstream(
                "authz.rule_engine_unreachable",
                "'reasons' result was not a list",
            )),
        }
    }
}
