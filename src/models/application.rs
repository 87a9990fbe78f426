//! Application model - registered client applications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Application entity. Application access tokens carry the configured
/// grant types rather than resolved policy grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub client_id: String,
    pub name: String,
    pub grant_types: Vec<String>,
    pub enabled: bool,
    pub created_utc: DateTime<Utc>,
}

impl Application {
    /// Create a new enabled application.
    pub fn new(client_id: String, name: String, grant_types: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            name,
            grant_types,
            enabled: true,
            created_utc: Utc::now(),
        }
    }
}
