use std::collections::BTreeMap;

use flowpilot_core::error::FlowPilotError;
use flowpilot_core::wire::{Action, AuthzRequest, Context, PrincipalRef, Resource, ResourceOwner, Subject};
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::authz_client::AuthzClient;
use crate::domain_client::DomainClient;
use crate::types::{ItemDecision, ItemResult, ItemStatus, PrincipalUser, RunError, RunRecord};

/// Executes a workflow item-by-item against the domain service, gated by a
/// workflow-level pre-flight check and a per-item authorization decision.
/// Grounded in `ai_agent_core.py`'s `execute_workflow_run` /
/// `check_workflow_execution_authorization` / `execute_workflow_item`.
pub struct Runner {
    domain: DomainClient,
    authz: AuthzClient,
    agent_sub: String,
}

impl Runner {
    #[must_use]
    pub fn new(domain: DomainClient, authz: AuthzClient, agent_sub: impl Into<String>) -> Self {
        Self {
            domain,
            authz,
            agent_sub: agent_sub.into(),
        }
    }

    pub async fn run(&self, run_id: String, workflow_id: &str, principal: PrincipalUser, dry_run: bool) -> Result<RunRecord, FlowPilotError> {
        let workflow = self.domain.fetch_workflow(workflow_id).await?;

        let preflight = self.evaluate_workflow_action(&workflow, &principal, "execute", dry_run).await?;
        if !preflight.is_allow() {
            return Ok(RunRecord {
                run_id,
                workflow_id: workflow_id.to_string(),
                principal,
                dry_run,
                results: Vec::new(),
                error: Some(RunError {
                    message: "principal is not authorized to execute this workflow".to_string(),
                    reason_codes: preflight.reason_codes,
                }),
            });
        }

        let listing = self
            .domain
            .list_items(workflow_id, &principal.persona_title, principal.persona_circle.as_deref())
            .await?;

        if listing.status == StatusCode::FORBIDDEN {
            let (reason_codes, message) = extract_deny(&listing.body, "workflow_access_denied", "principal does not have read access to this workflow");
            return Ok(RunRecord {
                run_id,
                workflow_id: workflow_id.to_string(),
                principal,
                dry_run,
                results: Vec::new(),
                error: Some(RunError { message, reason_codes }),
            });
        }
        if !listing.status.is_success() {
            return Err(FlowPilotError::upstream(
                "agent_runner.item_listing_failed",
                format!("workflow item listing returned {}", listing.status),
            ));
        }

        let items = DomainClient::parse_items(&listing.body);
        let principal_value = serde_json::to_value(&principal)
            .map_err(|err| FlowPilotError::storage(format!("could not serialize principal: {err}")))?;

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let outcome = self
                .domain
                .execute_item(workflow_id, &item.item_id, &principal_value, dry_run)
                .await;
            let result = match outcome {
                Ok(response) => classify_item_response(&item.item_id, &item.kind, response.status, &response.body),
                Err(err) => ItemResult {
                    item_id: item.item_id,
                    kind: item.kind,
                    status: ItemStatus::Error,
                    decision: ItemDecision::Deny,
                    reason_codes: vec!["agent_runner.item_execution_failed".to_string()],
                    advice: vec![json!({"type": "error", "message": err.detail})],
                },
            };
            results.push(result);
        }

        Ok(RunRecord {
            run_id,
            workflow_id: workflow_id.to_string(),
            principal,
            dry_run,
            results,
            error: None,
        })
    }

    async fn evaluate_workflow_action(
        &self,
        workflow: &crate::types::WorkflowMetadata,
        principal: &PrincipalUser,
        action: &str,
        dry_run: bool,
    ) -> Result<flowpilot_core::wire::AuthzResponse, FlowPilotError> {
        let owner_persona_title = workflow
            .owner_persona_title
            .clone()
            .ok_or_else(|| FlowPilotError::invalid_argument("agent_runner.owner_persona_missing", format!("workflow {} is missing owner_persona_title", workflow.workflow_id)))?;

        let mut resource_properties = BTreeMap::new();
        resource_properties.insert("workflow_id".to_string(), json!(workflow.workflow_id));
        resource_properties.insert("domain".to_string(), json!(workflow.domain));
        if let Some(departure_date) = &workflow.departure_date {
            resource_properties.insert("departure_date".to_string(), json!(departure_date));
        }
        if let Some(owner_sub) = &workflow.owner_sub {
            resource_properties.insert(
                "owner".to_string(),
                serde_json::to_value(ResourceOwner {
                    kind: Some("user".to_string()),
                    id: owner_sub.clone(),
                    persona_title: Some(owner_persona_title),
                    persona_circle: workflow.owner_persona_circle.clone(),
                    extra: BTreeMap::new(),
                })
                .map_err(|err| FlowPilotError::storage(err.to_string()))?,
            );
        }

        let mut principal_extra = BTreeMap::new();
        if let Some(circle) = &principal.persona_circle {
            principal_extra.insert("persona_circle".to_string(), json!(circle));
        }

        let request = AuthzRequest {
            subject: Subject {
                kind: "agent".to_string(),
                id: self.agent_sub.clone(),
                properties: BTreeMap::new(),
            },
            action: Action { name: action.to_string() },
            resource: Resource {
                kind: Some("workflow".to_string()),
                id: Some(workflow.workflow_id.clone()),
                properties: resource_properties,
            },
            context: Context {
                principal: PrincipalRef {
                    id: Some(principal.id.clone()),
                    persona: Some(principal.persona_title.clone()),
                    extra: principal_extra,
                },
                policy_hint: Some(workflow.domain.clone()),
            },
            options: flowpilot_core::wire::Options {
                explain: true,
                dry_run,
                ..Default::default()
            },
        };

        self.authz.evaluate(&request).await
    }
}

/// Classifies a domain-service execution response per spec §4.5: 2xx is an
/// allow, 403 is a deny (still a *completed* item, not a failure), anything
/// else is an execution error.
fn classify_item_response(item_id: &str, kind: &str, status: StatusCode, body: &Value) -> ItemResult {
    if status.is_success() {
        return ItemResult {
            item_id: item_id.to_string(),
            kind: kind.to_string(),
            status: ItemStatus::Completed,
            decision: ItemDecision::Allow,
            reason_codes: Vec::new(),
            advice: Vec::new(),
        };
    }

    if status == StatusCode::FORBIDDEN {
        let (reason_codes, message) = extract_deny(body, "", "Access denied");
        return ItemResult {
            item_id: item_id.to_string(),
            kind: kind.to_string(),
            status: ItemStatus::Completed,
            decision: ItemDecision::Deny,
            reason_codes,
            advice: vec![json!({"type": "deny", "message": message})],
        };
    }

    ItemResult {
        item_id: item_id.to_string(),
        kind: kind.to_string(),
        status: ItemStatus::Error,
        decision: ItemDecision::Deny,
        reason_codes: vec!["agent_runner.item_execution_failed".to_string()],
        advice: vec![json!({"type": "error", "message": format!("domain service returned {status} for item {item_id}")})],
    }
}

/// Extracts `(reason_codes, message)` from a 403 body. Prefers a structured
/// `{"detail": {"reason_codes": [...], "advice": [...]}}` shape; falls back
/// to a heuristic scan of `detail`/the raw body text for a
/// `reason_codes=[...]` fragment when the domain service hasn't adopted the
/// structured contract yet. A robust domain service should emit the
/// structured body; the heuristic exists only to carry legacy responses.
fn extract_deny(body: &Value, default_reason: &str, default_message: &str) -> (Vec<String>, String) {
    if let Some(detail) = body.get("detail") {
        if let Some(detail_obj) = detail.as_object() {
            let reason_codes = detail_obj
                .get("reason_codes")
                .and_then(Value::as_array)
                .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>())
                .unwrap_or_default();
            if !reason_codes.is_empty() {
                return (reason_codes, default_message.to_string());
            }
        }
        if let Some(text) = detail.as_str() {
            return parse_policy_deny_from_text(text, default_reason, default_message);
        }
    }

    let text = body.as_str().map(str::to_string).unwrap_or_else(|| body.to_string());
    parse_policy_deny_from_text(&text, default_reason, default_message)
}

fn parse_policy_deny_from_text(text: &str, default_reason: &str, default_message: &str) -> (Vec<String>, String) {
    let message = text.trim();
    let message = if message.is_empty() { default_message } else { message };

    if let Some(start) = message.find("reason_codes=") {
        let fragment = &message[start..];
        if let (Some(left), Some(right)) = (fragment.find('['), fragment.find(']')) {
            if right > left {
                let content = &fragment[left + 1..right];
                let codes: Vec<String> = content
                    .split(',')
                    .map(|part| part.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
                    .filter(|part| !part.is_empty())
                    .collect();
                if !codes.is_empty() {
                    return (codes, message.to_string());
                }
            }
        }
    }

    let reason_codes = if default_reason.is_empty() { Vec::new() } else { vec![default_reason.to_string()] };
    (reason_codes, message.to_string())
}
