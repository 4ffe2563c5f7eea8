use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use flowpilot_core::normalize::NormalizedValue;
use serde::{Deserialize, Serialize};

/// Composite `(user_sub, title, circle)` identity, stringified as the
/// record's persistence key (spec §3, grounded in `personadb_sqlite.py`'s
/// `persona_id = f"{user_sub}_{title}_{circle}"`).
#[must_use]
pub fn persona_id(user_sub: &str, title: &str, circle: &str) -> String {
    format!("{user_sub}_{title}_{circle}")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Persona {
    pub id: String,
    pub user_sub: String,
    pub title: String,
    pub circle: String,
    pub scope: BTreeSet<String>,
    pub valid_from: DateTime<Utc>,
    pub valid_till: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub attributes: BTreeMap<String, NormalizedValue>,
}
