//! Grant model - (owner, policy, level) records.
//!
//! Ownership is a tagged union rather than an entity hierarchy so the
//! resolver can consume every grant source through the same shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scopes::AccessLevel;

/// Who holds a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum GrantOwner {
    User(Uuid),
    Group(Uuid),
    Application(Uuid),
    Visa(Uuid),
}

impl GrantOwner {
    pub fn id(&self) -> Uuid {
        match self {
            GrantOwner::User(id)
            | GrantOwner::Group(id)
            | GrantOwner::Application(id)
            | GrantOwner::Visa(id) => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GrantOwner::User(_) => "user",
            GrantOwner::Group(_) => "group",
            GrantOwner::Application(_) => "application",
            GrantOwner::Visa(_) => "visa",
        }
    }
}

/// Grant entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub id: Uuid,
    pub policy_id: Uuid,
    pub level: AccessLevel,
    pub owner: GrantOwner,
    pub created_utc: DateTime<Utc>,
}

impl Grant {
    /// Create a new grant.
    pub fn new(owner: GrantOwner, policy_id: Uuid, level: AccessLevel) -> Self {
        Self {
            id: Uuid::new_v4(),
            policy_id,
            level,
            owner,
            created_utc: Utc::now(),
        }
    }
}

/// A principal the resolver can compute effective permissions for.
///
/// Visas are deliberately not principals: visa grants enter through the
/// federated resolution path, not through direct ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    User(Uuid),
    Application(Uuid),
}

impl Principal {
    pub fn id(&self) -> Uuid {
        match self {
            Principal::User(id) | Principal::Application(id) => *id,
        }
    }
}
