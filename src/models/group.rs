//! Group model - flat grant-holding collections of users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Group entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}

impl Group {
    /// Create a new group.
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            created_utc: Utc::now(),
        }
    }
}
