//! Policy model - named protectable resource identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Policy entity. The `key` is the natural unique key and the identity
/// scopes are expressed against; it is immutable once any grant references
/// the policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: Uuid,
    pub key: String,
    pub description: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Policy {
    /// Create a new policy.
    pub fn new(key: String, description: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            description,
            created_utc: Utc::now(),
        }
    }
}
