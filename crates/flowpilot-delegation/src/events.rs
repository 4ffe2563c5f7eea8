use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type EventId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    EdgeCreated {
        id: Uuid,
        principal_id: String,
        delegate_id: String,
        workflow_id: Option<String>,
        scope: BTreeSet<String>,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    },
    EdgeWidened {
        id: Uuid,
        scope: BTreeSet<String>,
        expires_at: DateTime<Utc>,
    },
    EdgeRevoked {
        id: Uuid,
        revoked_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub id: EventId,
    pub occurred_at: DateTime<Utc>,
    pub event: Event,
}

impl EventEnvelope {
    #[must_use]
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            event,
        }
    }
}
