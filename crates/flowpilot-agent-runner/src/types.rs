use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The identity the runner acts on behalf of, carried through to both the
/// Authorization Engine and the domain service (spec §4.5, grounded in
/// `ai_agent_core.py`'s `principal_user` dict).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalUser {
    pub id: String,
    pub persona_title: String,
    #[serde(default)]
    pub persona_circle: Option<String>,
}

/// One workflow item as the domain service reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowItem {
    #[serde(alias = "workflow_item_id", alias = "itinerary_item_id")]
    pub item_id: String,
    #[serde(default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowItemsResponse {
    #[serde(default)]
    pub items: Vec<WorkflowItem>,
}

/// Workflow metadata as `GET /v1/workflows/{id}` reports it — enough to
/// build the authorization resource (domain, owner) for the pre-flight and
/// per-item checks.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowMetadata {
    pub workflow_id: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default)]
    pub owner_sub: Option<String>,
    #[serde(default)]
    pub owner_persona_title: Option<String>,
    #[serde(default)]
    pub owner_persona_circle: Option<String>,
    #[serde(default)]
    pub departure_date: Option<String>,
}

fn default_domain() -> String {
    "travel".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemDecision {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemResult {
    pub item_id: String,
    pub kind: String,
    pub status: ItemStatus,
    pub decision: ItemDecision,
    #[serde(default)]
    pub reason_codes: Vec<String>,
    #[serde(default)]
    pub advice: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub message: String,
    pub reason_codes: Vec<String>,
}

/// `{run_id, workflow_id, principal, dry_run, results[]}` (spec §4.5).
/// `error` is populated only when pre-flight or listing denies the whole
/// run; a run with mixed per-item allow/deny outcomes has `error: None` —
/// policy denies are results, not failures.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: String,
    pub workflow_id: String,
    pub principal: PrincipalUser,
    pub dry_run: bool,
    pub results: Vec<ItemResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}
