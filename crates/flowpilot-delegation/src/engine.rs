use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flowpilot_core::error::FlowPilotError;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::events::{Event, EventEnvelope};
use crate::store::{EventStore, StoreError};
use crate::types::{ActionScope, DelegationEdge, DelegationPath, EdgeId};

const DEFAULT_MAX_DEPTH: usize = 5;

fn invalid(reason_code: &'static str, detail: impl Into<String>) -> FlowPilotError {
    FlowPilotError::invalid_argument(reason_code, detail)
}

fn storage(err: StoreError) -> FlowPilotError {
    FlowPilotError::storage(err.to_string())
}

#[derive(Debug, Clone)]
pub struct DelegationEngineBuilder {
    event_path: PathBuf,
}

impl Default for DelegationEngineBuilder {
    fn default() -> Self {
        Self {
            event_path: PathBuf::from("state/delegation-events.jsonl"),
        }
    }
}

impl DelegationEngineBuilder {
    #[must_use]
    pub fn with_event_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.event_path = path.as_ref().to_path_buf();
        self
    }

    pub fn build(self) -> Result<DelegationGraph, FlowPilotError> {
        let event_store = Arc::new(EventStore::open(&self.event_path).map_err(storage)?);
        let mut state = HashMap::new();
        let events = event_store.load().map_err(storage)?;
        for envelope in events {
            apply_event(&mut state, &envelope.event);
        }
        Ok(DelegationGraph {
            event_store,
            state: Arc::new(RwLock::new(state)),
        })
    }
}

/// The Delegation Graph (C1): directed, scoped, expiring edges between
/// principals, backed by an event-sourced append-only log (spec §4.1).
#[derive(Debug, Clone)]
pub struct DelegationGraph {
    event_store: Arc<EventStore>,
    state: Arc<RwLock<HashMap<EdgeId, DelegationEdge>>>,
}

impl DelegationGraph {
    #[must_use]
    pub fn builder() -> DelegationEngineBuilder {
        DelegationEngineBuilder::default()
    }

    /// Create or widen the live edge for `(principal, delegate, workflow_id)`.
    pub fn insert(
        &self,
        principal_id: &str,
        delegate_id: &str,
        expires_at: DateTime<Utc>,
        workflow_id: Option<String>,
        scope: Option<BTreeSet<String>>,
    ) -> Result<(DelegationEdge, bool), FlowPilotError> {
        if principal_id == delegate_id {
            return Err(invalid(
                "delegation.self_delegation",
                "principal and delegate must differ",
            ));
        }
        let now = Utc::now();
        if expires_at <= now {
            return Err(invalid(
                "delegation.invalid_expiry",
                "expires_at must be in the future",
            ));
        }
        let scope = scope.unwrap_or_else(|| BTreeSet::from(["read".to_string(), "execute".to_string()]));
        if scope.is_empty() || scope.iter().any(|s| s.trim().is_empty()) {
            return Err(invalid(
                "delegation.invalid_scope",
                "scope must be a non-empty set of non-empty action names",
            ));
        }

        let mut state = self.state.write();
        let existing = state.values_mut().find(|edge| {
            edge.same_triple(principal_id, delegate_id, workflow_id.as_deref()) && edge.is_live(now)
        });

        if let Some(existing) = existing {
            if scope.is_subset(&existing.scope) && expires_at <= existing.expires_at {
                return Ok((existing.clone(), false));
            }
            let merged_scope: BTreeSet<String> = existing.scope.union(&scope).cloned().collect();
            let merged_expiry = existing.expires_at.max(expires_at);
            existing.scope = merged_scope.clone();
            existing.expires_at = merged_expiry;
            let envelope = EventEnvelope::new(Event::EdgeWidened {
                id: existing.id,
                scope: merged_scope,
                expires_at: merged_expiry,
            });
            self.event_store.append(&envelope).map_err(storage)?;
            tracing::info!(edge_id = %existing.id, %principal_id, %delegate_id, "delegation edge widened");
            return Ok((existing.clone(), false));
        }

        let id = Uuid::new_v4();
        let edge = DelegationEdge {
            id,
            principal_id: principal_id.to_string(),
            delegate_id: delegate_id.to_string(),
            workflow_id: workflow_id.clone(),
            scope: scope.clone(),
            expires_at,
            created_at: now,
            revoked_at: None,
        };
        let envelope = EventEnvelope::new(Event::EdgeCreated {
            id,
            principal_id: principal_id.to_string(),
            delegate_id: delegate_id.to_string(),
            workflow_id,
            scope,
            expires_at,
            created_at: now,
        });
        self.event_store.append(&envelope).map_err(storage)?;
        state.insert(id, edge.clone());
        tracing::info!(edge_id = %id, %principal_id, %delegate_id, "delegation edge created");
        Ok((edge, true))
    }

    /// Revoke the one live edge for `(principal, delegate, workflow_id)`.
    /// Idempotent: returns `false` if none live.
    pub fn revoke(
        &self,
        principal_id: &str,
        delegate_id: &str,
        workflow_id: Option<&str>,
    ) -> Result<bool, FlowPilotError> {
        let now = Utc::now();
        let mut state = self.state.write();
        let Some(edge) = state
            .values_mut()
            .find(|edge| edge.same_triple(principal_id, delegate_id, workflow_id) && edge.is_live(now))
        else {
            return Ok(false);
        };
        edge.revoked_at = Some(now);
        let edge_id = edge.id;
        let envelope = EventEnvelope::new(Event::EdgeRevoked {
            id: edge_id,
            revoked_at: now,
        });
        self.event_store.append(&envelope).map_err(storage)?;
        tracing::info!(%edge_id, %principal_id, %delegate_id, "delegation edge revoked");
        Ok(true)
    }

    pub fn list_outgoing(
        &self,
        principal_id: &str,
        workflow_id: Option<&str>,
        include_expired: bool,
    ) -> Vec<DelegationEdge> {
        self.list_matching(workflow_id, include_expired, |edge| {
            edge.principal_id == principal_id
        })
    }

    pub fn list_incoming(
        &self,
        delegate_id: &str,
        workflow_id: Option<&str>,
        include_expired: bool,
    ) -> Vec<DelegationEdge> {
        self.list_matching(workflow_id, include_expired, |edge| {
            edge.delegate_id == delegate_id
        })
    }

    fn list_matching(
        &self,
        workflow_id: Option<&str>,
        include_expired: bool,
        endpoint: impl Fn(&DelegationEdge) -> bool,
    ) -> Vec<DelegationEdge> {
        let now = Utc::now();
        let state = self.state.read();
        let mut edges: Vec<DelegationEdge> = state
            .values()
            .filter(|edge| endpoint(edge))
            .filter(|edge| workflow_id.is_none() || edge.matches_workflow(workflow_id))
            .filter(|edge| include_expired || edge.is_live(now))
            .cloned()
            .collect();
        edges.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        edges
    }

    /// BFS/DFS over live edges, bounded by `max_depth`, returning the path
    /// whose action set contains `execute` if any such path exists,
    /// otherwise the shortest path (spec §4.1, testable property #2).
    pub fn find_path(
        &self,
        principal_id: &str,
        delegate_id: &str,
        workflow_id: Option<&str>,
        max_depth: Option<usize>,
    ) -> Option<DelegationPath> {
        if principal_id == delegate_id {
            return Some(DelegationPath {
                path: vec![principal_id.to_string()],
                delegated_actions: ActionScope::Unrestricted,
            });
        }
        let max_depth = max_depth.unwrap_or(DEFAULT_MAX_DEPTH);
        let now = Utc::now();
        let state = self.state.read();

        let mut candidates: Vec<(Vec<String>, BTreeSet<String>)> = Vec::new();
        let mut stack: Vec<(String, Vec<String>, Option<BTreeSet<String>>)> = vec![(
            principal_id.to_string(),
            vec![principal_id.to_string()],
            None,
        )];

        while let Some((node, path, scope_so_far)) = stack.pop() {
            if path.len() > max_depth + 1 {
                continue;
            }
            let outgoing = state.values().filter(|edge| {
                edge.principal_id == node
                    && edge.is_live(now)
                    && edge.matches_workflow(workflow_id)
                    && !path.contains(&edge.delegate_id)
            });
            for edge in outgoing {
                let next_scope: BTreeSet<String> = match &scope_so_far {
                    None => edge.scope.clone(),
                    Some(prev) => prev.intersection(&edge.scope).cloned().collect(),
                };
                let mut next_path = path.clone();
                next_path.push(edge.delegate_id.clone());
                if edge.delegate_id == delegate_id {
                    candidates.push((next_path, next_scope));
                } else if next_path.len() <= max_depth + 1 {
                    stack.push((edge.delegate_id.clone(), next_path, Some(next_scope)));
                }
            }
        }

        candidates.sort_by(|(path_a, scope_a), (path_b, scope_b)| {
            let a_has_execute = scope_a.contains("execute");
            let b_has_execute = scope_b.contains("execute");
            b_has_execute
                .cmp(&a_has_execute)
                .then(path_a.len().cmp(&path_b.len()))
        });

        candidates
            .into_iter()
            .next()
            .map(|(path, scope)| DelegationPath {
                path,
                delegated_actions: ActionScope::Restricted(scope),
            })
    }

    /// Re-replays the event log from disk and replaces in-memory state
    /// wholesale. Lets a process that only reads this graph (the
    /// Authorization Engine) observe mutations an owning `delegation-api`
    /// process makes, without restarting (spec §2).
    pub fn reload(&self) -> Result<(), FlowPilotError> {
        let events = self.event_store.load().map_err(storage)?;
        let mut state = HashMap::new();
        for envelope in events {
            apply_event(&mut state, &envelope.event);
        }
        *self.state.write() = state;
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<DelegationEdge> {
        let state = self.state.read();
        let mut edges: Vec<DelegationEdge> = state.values().cloned().collect();
        edges.sort_by_key(|edge| edge.id);
        edges
    }

    #[must_use]
    pub fn event_store(&self) -> Arc<EventStore> {
        Arc::clone(&self.event_store)
    }

    #[must_use]
    pub fn replay_snapshot(events: &[EventEnvelope]) -> Vec<DelegationEdge> {
        let mut state = HashMap::new();
        for envelope in events {
            apply_event(&mut state, &envelope.event);
        }
        let mut edges: Vec<DelegationEdge> = state.values().cloned().collect();
        edges.sort_by_key(|edge| edge.id);
        edges
    }
}

fn apply_event(state: &mut HashMap<EdgeId, DelegationEdge>, event: &Event) {
    match event {
        Event::EdgeCreated {
            id,
            principal_id,
            delegate_id,
            workflow_id,
            scope,
            expires_at,
            created_at,
        } => {
            state.insert(
                *id,
                DelegationEdge {
                    id: *id,
                    principal_id: principal_id.clone(),
                    delegate_id: delegate_id.clone(),
                    workflow_id: workflow_id.clone(),
                    scope: scope.clone(),
                    expires_at: *expires_at,
                    created_at: *created_at,
                    revoked_at: None,
                },
            );
        }
        Event::EdgeWidened {
            id,
            scope,
            expires_at,
        } => {
            if let Some(edge) = state.get_mut(id) {
                edge.scope = scope.clone();
                edge.expires_at = *expires_at;
            }
        }
        Event::EdgeRevoked { id, revoked_at } => {
            if let Some(edge) = state.get_mut(id) {
                edge.revoked_at = Some(*revoked_at);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn graph() -> DelegationGraph {
        let temp = tempfile::tempdir().unwrap();
        DelegationGraph::builder()
            .with_event_path(temp.path().join("events.jsonl"))
            .build()
            .unwrap()
    }

    #[test]
    fn insert_rejects_self_delegation() {
        let graph = graph();
        let err = graph
            .insert("alice", "alice", Utc::now() + Duration::hours(1), None, None)
            .unwrap_err();
        assert_eq!(err.reason_code, "delegation.self_delegation");
    }

    #[test]
    fn insert_rejects_past_expiry() {
        let graph = graph();
        let err = graph
            .insert("alice", "bob", Utc::now() - Duration::hours(1), None, None)
            .unwrap_err();
        assert_eq!(err.reason_code, "delegation.invalid_expiry");
    }

    #[test]
    fn repeat_insert_with_subset_scope_is_noop() {
        let graph = graph();
        let expiry = Utc::now() + Duration::hours(2);
        let (first, created) = graph
            .insert(
                "alice",
                "bob",
                expiry,
                None,
                Some(BTreeSet::from(["read".into(), "execute".into()])),
            )
            .unwrap();
        assert!(created);
        let (second, created) = graph
            .insert(
                "alice",
                "bob",
                expiry - Duration::minutes(30),
                None,
                Some(BTreeSet::from(["read".into()])),
            )
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(second.scope, first.scope);
        assert_eq!(second.expires_at, first.expires_at);
    }

    #[test]
    fn repeat_insert_with_wider_scope_widens_edge() {
        let graph = graph();
        let expiry = Utc::now() + Duration::hours(1);
        let (first, _) = graph
            .insert(
                "alice",
                "bob",
                expiry,
                None,
                Some(BTreeSet::from(["read".into()])),
            )
            .unwrap();
        let later_expiry = expiry + Duration::hours(5);
        let (second, created) = graph
            .insert(
                "alice",
                "bob",
                later_expiry,
                None,
                Some(BTreeSet::from(["write".into()])),
            )
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(
            second.scope,
            BTreeSet::from(["read".to_string(), "write".to_string()])
        );
        assert_eq!(second.expires_at, later_expiry);
    }

    #[test]
    fn revoke_is_idempotent() {
        let graph = graph();
        graph
            .insert("alice", "bob", Utc::now() + Duration::hours(1), None, None)
            .unwrap();
        assert!(graph.revoke("alice", "bob", None).unwrap());
        assert!(!graph.revoke("alice", "bob", None).unwrap());
    }

    #[test]
    fn find_path_identity_is_unrestricted() {
        let graph = graph();
        let path = graph.find_path("alice", "alice", None, None).unwrap();
        assert_eq!(path.path, vec!["alice".to_string()]);
        assert_eq!(path.delegated_actions, ActionScope::Unrestricted);
    }

    #[test]
    fn find_path_intersects_scopes_along_chain() {
        let graph = graph();
        let expiry = Utc::now() + Duration::hours(1);
        graph
            .insert(
                "alice",
                "bob",
                expiry,
                None,
                Some(BTreeSet::from(["read".into(), "execute".into()])),
            )
            .unwrap();
        graph
            .insert(
                "bob",
                "carol",
                expiry,
                None,
                Some(BTreeSet::from(["read".into()])),
            )
            .unwrap();

        let path = graph.find_path("alice", "carol", None, None).unwrap();
        assert_eq!(path.path, vec!["alice", "bob", "carol"]);
        assert_eq!(
            path.delegated_actions,
            ActionScope::Restricted(BTreeSet::from(["read".to_string()]))
        );
    }

    #[test]
    fn find_path_respects_max_depth_cutoff() {
        let graph = graph();
        let expiry = Utc::now() + Duration::hours(1);
        graph.insert("a", "b", expiry, None, None).unwrap();
        graph.insert("b", "c", expiry, None, None).unwrap();

        assert!(graph.find_path("a", "c", None, Some(1)).is_none());
        assert!(graph.find_path("a", "c", None, Some(2)).is_some());
    }

    #[test]
    fn find_path_prefers_execute_over_shortest() {
        let graph = graph();
        let expiry = Utc::now() + Duration::hours(1);
        // Short path without execute.
        graph
            .insert(
                "alice",
                "carol",
                expiry,
                None,
                Some(BTreeSet::from(["read".into()])),
            )
            .unwrap();
        // Longer path that preserves execute end to end.
        graph
            .insert(
                "alice",
                "bob",
                expiry,
                None,
                Some(BTreeSet::from(["read".into(), "execute".into()])),
            )
            .unwrap();
        graph
            .insert(
                "bob",
                "carol",
                expiry,
                None,
                Some(BTreeSet::from(["read".into(), "execute".into()])),
            )
            .unwrap();

        let path = graph.find_path("alice", "carol", None, None).unwrap();
        assert_eq!(path.path, vec!["alice", "bob", "carol"]);
        assert!(matches!(
            path.delegated_actions,
            ActionScope::Restricted(ref s) if s.contains("execute")
        ));
    }

    #[test]
    fn list_outgoing_excludes_revoked_by_default() {
        let graph = graph();
        graph
            .insert("alice", "bob", Utc::now() + Duration::hours(1), None, None)
            .unwrap();
        graph.revoke("alice", "bob", None).unwrap();
        assert!(graph.list_outgoing("alice", None, false).is_empty());
        assert_eq!(graph.list_outgoing("alice", None, true).len(), 1);
    }
}
