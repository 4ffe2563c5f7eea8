use std::sync::Arc;

use flowpilot_cache::{CacheKey, FamilyCache};
use flowpilot_core::normalize::{normalize, AttributeSource};
use flowpilot_core::wire::{AuthzDecision, AuthzRequest, AuthzResponse, ResourceOwner};
use flowpilot_delegation::{ActionScope, DelegationGraph};
use flowpilot_persona::{persona_id, Persona, PersonaRegistry};
use flowpilot_policy::{Manifest, ManifestRegistry};
use serde_json::{json, Value};

use crate::rule_client::RuleEngineClient;
use crate::types::DelegationBlock;

/// The Authorization Engine (C4): the AuthZEN-shaped PDP. Composes the
/// Delegation Graph (C1) and Persona Registry (C2) as in-process reads, the
/// Policy Manifest Loader (C3) for validation, and the external rule engine
/// for the final verdict.
pub struct Evaluator {
    manifests: parking_lot::RwLock<Arc<ManifestRegistry>>,
    delegation: Arc<DelegationGraph>,
    personas: Arc<PersonaRegistry>,
    rule_engine: RuleEngineClient,
    cache: Arc<FamilyCache>,
}

impl Evaluator {
    #[must_use]
    pub fn new(
        manifests: Arc<ManifestRegistry>,
        delegation: Arc<DelegationGraph>,
        personas: Arc<PersonaRegistry>,
        rule_engine: RuleEngineClient,
        cache: Arc<FamilyCache>,
    ) -> Self {
        Self {
            manifests: parking_lot::RwLock::new(manifests),
            delegation,
            personas,
            rule_engine,
            cache,
        }
    }

    /// Swaps in a freshly loaded manifest registry (`--reload`'s `SIGHUP`/
    /// `POST /admin/reload` path). In-flight evaluations keep using the
    /// registry snapshot they already took.
    pub fn reload_manifests(&self, manifests: Arc<ManifestRegistry>) {
        *self.manifests.write() = manifests;
    }

    /// Re-replays the delegation/persona event logs this process only
    /// reads, and drops any cached lookups derived from them. Without this,
    /// `delegation-api`/`persona-api` mutations made after this process
    /// started would never be observed here (spec §2: C4 "owns nothing;
    /// composes reads/writes over C1, C2"; its cache is "invalidated on
    /// mutating verbs" the moment this process learns of one).
    pub fn refresh_collaborator_state(&self) {
        match self.delegation.reload() {
            Ok(()) => self.cache.invalidate_family("delegation"),
            Err(err) => tracing::warn!(error = %err, "delegation state refresh failed, keeping previous snapshot"),
        }
        match self.personas.reload() {
            Ok(()) => self.cache.invalidate_family("persona"),
            Err(err) => tracing::warn!(error = %err, "persona state refresh failed, keeping previous snapshot"),
        }
    }

    /// The full six-step pipeline. Never returns `Err`: every failure mode
    /// maps to a fail-closed `deny` with a reason code, per the decision
    /// boundary's fail-closed contract.
    pub async fn evaluate(&self, request: &AuthzRequest) -> AuthzResponse {
        let response = self.evaluate_inner(request).await;
        tracing::info!(
            subject_id = %request.subject.id,
            action = %request.action.name,
            policy_hint = request.context.policy_hint.as_deref().unwrap_or(""),
            decision = ?response.decision,
            reason_codes = ?response.reason_codes,
            "authorization decision reached"
        );
        response
    }

    async fn evaluate_inner(&self, request: &AuthzRequest) -> AuthzResponse {
        // Step 1: select manifest. Cloned out from under the lock so the
        // rest of this call sees a consistent snapshot even if `--reload`
        // swaps the registry mid-flight.
        let manifest = {
            let registry = self.manifests.read();
            match registry.select(request.context.policy_hint.as_deref()) {
                Ok(manifest) => manifest.clone(),
                Err(_) => return AuthzResponse::deny("authz.invalid_policy"),
            }
        };
        let manifest = &manifest;

        // Step 2: build subject.
        if request.subject.id.trim().is_empty() {
            return AuthzResponse::deny("authz.invalid_subject");
        }
        if request.subject.kind == "user" {
            let persona = request
                .subject
                .properties
                .get("persona")
                .and_then(Value::as_str)
                .filter(|p| !p.trim().is_empty());
            if persona.is_none() {
                return AuthzResponse::deny("authz.invalid_subject");
            }
        }

        // Step 3: build action. Membership is checked against the global
        // allowed-actions set (every title, every manifest), not just the
        // selected manifest's — a shared action vocabulary is a platform
        // concept, manifests only narrow which titles may use which actions.
        if !self.manifests.read().all_actions().contains(&request.action.name) {
            return AuthzResponse::deny("authz.invalid_action");
        }

        // Step 4: build resource.
        let mut resource_properties = request.resource.properties.clone();
        let normalized_resource_attrs =
            match normalize(&resource_properties, &manifest.attributes, AttributeSource::Resource) {
                Ok(attrs) => attrs,
                Err(_) => return AuthzResponse::deny("authz.missing_required_attributes"),
            };
        for (name, value) in normalized_resource_attrs {
            resource_properties.insert(name, value.to_json());
        }

        let owner = request.resource.owner();
        if let Some(owner) = &owner {
            match self.fetch_owner_persona(owner).await {
                Ok(Some(persona)) => {
                    if let Some(Value::Object(owner_obj)) = resource_properties.get_mut("owner") {
                        for (name, value) in &persona.attributes {
                            owner_obj.insert(name.clone(), value.to_json());
                        }
                    }
                }
                Ok(None) | Err(_) => return AuthzResponse::deny("authz.persona_fetch_failed"),
            }
        }

        // Step 5: build context.
        let principal_id = request.context.principal.id.as_deref().unwrap_or("").trim();
        let principal_persona_title = request.context.principal.persona.as_deref().unwrap_or("").trim();
        if principal_id.is_empty() || principal_persona_title.is_empty() {
            return AuthzResponse::deny("authz.system_error");
        }

        let mut principal_value = json!({
            "id": principal_id,
            "persona": principal_persona_title,
        });
        if let Value::Object(obj) = &mut principal_value {
            for (key, value) in &request.context.principal.extra {
                obj.insert(key.clone(), value.clone());
            }
        }
        let principal_circle = request
            .context
            .principal
            .extra
            .get("persona_circle")
            .and_then(Value::as_str);
        match self
            .fetch_principal_persona(principal_id, principal_persona_title, principal_circle)
            .await
        {
            Some(persona) => {
                if let Value::Object(obj) = &mut principal_value {
                    obj.insert("status".into(), json!(persona.status));
                    obj.insert("valid_from".into(), json!(persona.valid_from));
                    obj.insert("valid_till".into(), json!(persona.valid_till));
                }
            }
            None => {
                if let Value::Object(obj) = &mut principal_value {
                    obj.insert("status".into(), json!("not_found"));
                }
            }
        }

        let owner_id = owner.as_ref().map(|o| o.id.clone());
        let mut context_value = json!({
            "principal": principal_value,
            "policy_hint": manifest.name,
        });

        if let Some(owner_id) = &owner_id {
            if owner_id.as_str() != principal_id {
                let workflow_id = resource_properties
                    .get("workflow_id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| {
                        (request.resource.kind.as_deref() == Some("workflow"))
                            .then(|| request.resource.id.clone())
                            .flatten()
                    });

                let block = self
                    .fetch_delegation_block(owner_id, principal_id, workflow_id.as_deref(), manifest)
                    .await;
                if let Value::Object(obj) = &mut context_value {
                    obj.insert(
                        "delegation".into(),
                        json!({
                            "delegation_chain": block.delegation_chain,
                            "delegated_actions": block.delegated_actions,
                        }),
                    );
                }
            }
        }

        // Step 6: evaluate against the rule engine.
        let input = json!({
            "subject": request.subject,
            "action": request.action,
            "resource": {
                "type": request.resource.kind,
                "id": request.resource.id,
                "properties": resource_properties,
            },
            "context": context_value,
        });

        let cache_key = CacheKey::new(
            "authz",
            format!("package={}&input={}", manifest.rule_package, input),
        );
        let decision = self
            .cache
            .get_or_fetch(&cache_key, || async {
                let allow = self.rule_engine.allow(&manifest.rule_package, &input).await?;
                let reasons = self.rule_engine.reasons(&manifest.rule_package, &input).await?;
                Ok::<Value, flowpilot_core::error::FlowPilotError>(json!({
                    "allow": allow,
                    "reasons": reasons,
                }))
            })
            .await;

        let decision = match decision {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, package = %manifest.rule_package, "rule engine call failed");
                return AuthzResponse::deny("authz.system_error");
            }
        };

        let allow = decision.get("allow").and_then(Value::as_bool).unwrap_or(false);
        let reasons: Vec<String> = decision
            .get("reasons")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        AuthzResponse {
            decision: if allow { AuthzDecision::Allow } else { AuthzDecision::Deny },
            reason_codes: reasons,
            advice: Vec::new(),
        }
    }

    async fn fetch_owner_persona(
        &self,
        owner: &ResourceOwner,
    ) -> Result<Option<Persona>, flowpilot_core::error::FlowPilotError> {
        let Some(title) = &owner.persona_title else {
            return Ok(None);
        };
        let key = CacheKey::new(
            "persona",
            format!(
                "id={}&title={}&circle={}",
                owner.id,
                title,
                owner.persona_circle.as_deref().unwrap_or("")
            ),
        );
        let found = self
            .cache
            .get_or_fetch(&key, || async {
                let persona = find_persona(&self.personas, &owner.id, title, owner.persona_circle.as_deref());
                Ok::<Value, flowpilot_core::error::FlowPilotError>(
                    persona.map(|p| serde_json::to_value(p).unwrap_or(Value::Null)).unwrap_or(Value::Null),
                )
            })
            .await?;
        if found.is_null() {
            Ok(None)
        } else {
            Ok(serde_json::from_value(found.as_ref().clone()).ok())
        }
    }

    async fn fetch_principal_persona(
        &self,
        user_sub: &str,
        title: &str,
        circle: Option<&str>,
    ) -> Option<Persona> {
        let key = CacheKey::new(
            "persona",
            format!("id={user_sub}&title={title}&circle={}", circle.unwrap_or("")),
        );
        let found = self
            .cache
            .get_or_fetch(&key, || async {
                let persona = find_persona(&self.personas, user_sub, title, circle);
                Ok::<Value, ()>(persona.map(|p| serde_json::to_value(p).unwrap_or(Value::Null)).unwrap_or(Value::Null))
            })
            .await
            .ok()?;
        if found.is_null() {
            None
        } else {
            serde_json::from_value(found.as_ref().clone()).ok()
        }
    }

    async fn fetch_delegation_block(
        &self,
        owner_id: &str,
        principal_id: &str,
        workflow_id: Option<&str>,
        manifest: &Manifest,
    ) -> DelegationBlock {
        let key = CacheKey::new(
            "delegation",
            format!(
                "owner={owner_id}&principal={principal_id}&workflow={}",
                workflow_id.unwrap_or("")
            ),
        );
        let found = self
            .cache
            .get_or_fetch(&key, || async {
                let path = self.delegation.find_path(owner_id, principal_id, workflow_id, None);
                Ok::<Value, ()>(path.map(|p| serde_json::to_value(p).unwrap_or(Value::Null)).unwrap_or(Value::Null))
            })
            .await
            .ok()
            .flatten_or_null();

        let Some(path) = found.and_then(|v| serde_json::from_value::<flowpilot_delegation::DelegationPath>(v).ok()) else {
            return DelegationBlock::empty();
        };

        let delegated_actions = match path.delegated_actions {
            ActionScope::Unrestricted => manifest.allowed_actions().into_iter().collect(),
            ActionScope::Restricted(scope) => scope.into_iter().collect(),
        };
        DelegationBlock {
            delegation_chain: path.path,
            delegated_actions,
        }
    }
}

trait OptionValueExt {
    fn flatten_or_null(self) -> Option<Value>;
}

impl OptionValueExt for Option<Arc<Value>> {
    fn flatten_or_null(self) -> Option<Value> {
        self.map(|v| v.as_ref().clone()).filter(|v| !v.is_null())
    }
}

fn find_persona(registry: &PersonaRegistry, user_sub: &str, title: &str, circle: Option<&str>) -> Option<Persona> {
    if let Some(circle) = circle {
        let id = persona_id(user_sub, title, circle);
        if let Some(persona) = registry.get(&id) {
            return Some(persona);
        }
    }
    registry
        .list_by_title(title, None)
        .into_iter()
        .find(|p| p.user_sub == user_sub)
}
