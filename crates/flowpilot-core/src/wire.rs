//! The AuthZEN-shaped request/response exchanged with the Authorization
//! Engine (`POST /v1/evaluate`), per spec §6.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResourceOwner {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_circle: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl Resource {
    #[must_use]
    pub fn owner(&self) -> Option<ResourceOwner> {
        let value = self.properties.get("owner")?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn domain(&self) -> Option<&str> {
        self.properties.get("domain")?.as_str()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PrincipalRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub principal: PrincipalRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Options {
    #[serde(default)]
    pub explain: bool,
    #[serde(default)]
    pub metrics: bool,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthzRequest {
    pub subject: Subject,
    pub action: Action,
    pub resource: Resource,
    pub context: Context,
    #[serde(default)]
    pub options: Options,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthzDecision {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthzResponse {
    pub decision: AuthzDecision,
    #[serde(default)]
    pub reason_codes: Vec<String>,
    #[serde(default)]
    pub advice: Vec<Value>,
}

impl AuthzResponse {
    #[must_use]
    pub fn deny(reason_code: impl Into<String>) -> Self {
        Self {
            decision: AuthzDecision::Deny,
            reason_codes: vec![reason_code.into()],
            advice: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_allow(&self) -> bool {
        self.decision == AuthzDecision::Allow
    }
}
