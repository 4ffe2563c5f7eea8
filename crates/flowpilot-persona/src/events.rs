use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use flowpilot_core::normalize::NormalizedValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type EventId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    PersonaCreated {
        id: String,
        user_sub: String,
        title: String,
        circle: String,
        scope: BTreeSet<String>,
        valid_from: DateTime<Utc>,
        valid_till: DateTime<Utc>,
        status: String,
        created_at: DateTime<Utc>,
        attributes: BTreeMap<String, NormalizedValue>,
    },
    PersonaUpdated {
        id: String,
        scope: BTreeSet<String>,
        valid_from: DateTime<Utc>,
        valid_till: DateTime<Utc>,
        status: String,
        updated_at: DateTime<Utc>,
        attributes: BTreeMap<String, NormalizedValue>,
    },
    PersonaDeleted {
        id: String,
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
