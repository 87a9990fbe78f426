//! User model - principals handed over by the SSO collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Pending,
    Approved,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Pending => "pending",
            UserStatus::Approved => "approved",
            UserStatus::Suspended => "suspended",
        }
    }
}

/// User entity. Users own no direct state here beyond identity, status and
/// group membership; their grants live in the grant table keyed by owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Stable subject identifier from the identity provider.
    pub subject: String,
    pub email: String,
    pub status: UserStatus,
    /// Groups contribute their grants transitively (one level, no nesting).
    pub group_ids: Vec<Uuid>,
    /// Client application the user was provisioned through, when known.
    /// Used to find users affected by an application-level grant change.
    pub application_id: Option<Uuid>,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl User {
    /// Create a new user in pending status.
    pub fn new(subject: String, email: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject,
            email,
            status: UserStatus::Pending,
            group_ids: Vec::new(),
            application_id: None,
            last_login_utc: None,
            created_utc: Utc::now(),
        }
    }

    /// Only approved users may hold credentials.
    pub fn is_approved(&self) -> bool {
        self.status == UserStatus::Approved
    }
}
