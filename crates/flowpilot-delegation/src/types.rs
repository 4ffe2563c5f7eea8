use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type EdgeId = Uuid;

/// A directed, scoped, expiring delegation edge `principal -> delegate`
/// (spec §3). Never physically deleted: revocation only sets `revoked_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DelegationEdge {
    pub id: EdgeId,
    pub principal_id: String,
    pub delegate_id: String,
    pub workflow_id: Option<String>,
    pub scope: BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl DelegationEdge {
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at <= now
    }

    /// Does this edge apply to `workflow_id`? An edge with `workflow_id =
    /// None` is global and matches any requested workflow (spec §4.1).
    #[must_use]
    pub fn matches_workflow(&self, workflow_id: Option<&str>) -> bool {
        match (&self.workflow_id, workflow_id) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(edge_wf), Some(requested)) => edge_wf == requested,
        }
    }

    /// Exact-triple match used by `insert`/`revoke` conflict detection,
    /// where `None` only matches `None` (unlike the broader `list_*` /
    /// `find_path` matching rule above).
    #[must_use]
    pub fn same_triple(&self, principal_id: &str, delegate_id: &str, workflow_id: Option<&str>) -> bool {
        self.principal_id == principal_id
            && self.delegate_id == delegate_id
            && self.workflow_id.as_deref() == workflow_id
    }

    /// The edge's liveness made explicit for list responses, distinguishing
    /// an explicit revoke from a passive expiry (spec's liveness predicate,
    /// made an observable field rather than something callers re-derive
    /// from `revoked_at`/`expires_at`).
    #[must_use]
    pub fn state(&self, now: DateTime<Utc>) -> EdgeState {
        if self.revoked_at.is_some() {
            EdgeState::Revoked
        } else if self.expires_at <= now {
            EdgeState::Expired
        } else {
            EdgeState::Live
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeState {
    Live,
    Revoked,
    Expired,
}

/// An edge paired with its derived `state`, the shape list endpoints return.
#[derive(Debug, Clone, Serialize)]
pub struct DelegationEdgeView {
    #[serde(flatten)]
    pub edge: DelegationEdge,
    pub state: EdgeState,
}

impl DelegationEdgeView {
    #[must_use]
    pub fn new(edge: DelegationEdge, now: DateTime<Utc>) -> Self {
        let state = edge.state(now);
        Self { edge, state }
    }
}

/// The action set a delegation path grants. Identity paths (`principal ==
/// delegate`) are unrestricted; every other path's action set is the
/// intersection of the scopes of the edges it traverses (spec §4.1,
/// testable property #2). C1 has no notion of a domain's full action set,
/// so `Unrestricted` is resolved by the caller (C4) against the selected
/// manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionScope {
    Unrestricted,
    Restricted(BTreeSet<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationPath {
    pub path: Vec<String>,
    pub delegated_actions: ActionScope,
}
