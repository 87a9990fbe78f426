//! Visa models - externally-attested claims and their local bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scopes::AccessLevel;

/// An externally-issued claim as decoded from a visa JWT inside a
/// passport. Not a local principal; it maps to policies only through
/// [`VisaPermission`] records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visa {
    #[serde(rename = "type")]
    pub visa_type: String,
    pub value: String,
    pub source: String,
    #[serde(default)]
    pub by: Option<String>,
}

/// Locally-configured binding of a visa `(type, value)` pair to a policy
/// at an access level, independent of any local user or group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisaPermission {
    pub id: Uuid,
    pub visa_type: String,
    pub visa_value: String,
    pub policy_id: Uuid,
    pub level: AccessLevel,
    pub created_utc: DateTime<Utc>,
}

impl VisaPermission {
    /// Create a new visa permission.
    pub fn new(
        visa_type: String,
        visa_value: String,
        policy_id: Uuid,
        level: AccessLevel,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            visa_type,
            visa_value,
            policy_id,
            level,
            created_utc: Utc::now(),
        }
    }
}
