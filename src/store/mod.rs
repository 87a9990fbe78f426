//! Repository seam for persisted entities.
//!
//! The engine never talks to a database directly; collaborators hand it an
//! [`AuthStore`] implementation. Invariant-protecting constraints (one
//! refresh token per user, unique api-key names) are the store's job, the
//! way a relational backend would enforce them with unique indexes. The
//! bundled [`MemoryStore`] models exactly that and backs the test suite.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ApiKey, Application, Grant, GrantOwner, Group, Policy, RefreshToken, User, VisaPermission,
};

/// Storage-layer failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint protecting an invariant was hit.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The targeted row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Backend failure (connection, serialization, ...).
    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Persisted-entity repository consumed by the engine.
#[async_trait]
pub trait AuthStore: Send + Sync {
    // -- users ------------------------------------------------------------

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn insert_user(&self, user: User) -> Result<(), StoreError>;

    /// Record a login timestamp. Issued tokens never wait on this write.
    async fn touch_last_login(&self, id: Uuid, when: DateTime<Utc>) -> Result<(), StoreError>;

    /// Ids of users belonging to a group.
    async fn users_in_group(&self, group_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    /// Ids of users provisioned through an application.
    async fn users_of_application(&self, application_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    // -- groups / applications -------------------------------------------

    async fn insert_group(&self, group: Group) -> Result<(), StoreError>;

    async fn insert_application(&self, application: Application) -> Result<(), StoreError>;

    async fn find_application(&self, id: Uuid) -> Result<Option<Application>, StoreError>;

    async fn find_application_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<Application>, StoreError>;

    // -- policies ---------------------------------------------------------

    async fn insert_policy(&self, policy: Policy) -> Result<(), StoreError>;

    async fn find_policy(&self, id: Uuid) -> Result<Option<Policy>, StoreError>;

    async fn find_policy_by_key(&self, key: &str) -> Result<Option<Policy>, StoreError>;

    /// Delete a policy row. Fails `UniqueViolation` while any grant
    /// references the policy; check and delete are one atomic unit.
    async fn delete_policy(&self, id: Uuid) -> Result<(), StoreError>;

    // -- grants -----------------------------------------------------------

    async fn insert_grant(&self, grant: Grant) -> Result<(), StoreError>;

    async fn find_grant(&self, id: Uuid) -> Result<Option<Grant>, StoreError>;

    async fn update_grant_level(
        &self,
        id: Uuid,
        level: crate::scopes::AccessLevel,
    ) -> Result<Grant, StoreError>;

    async fn delete_grant(&self, id: Uuid) -> Result<Grant, StoreError>;

    async fn grants_for_owner(&self, owner: GrantOwner) -> Result<Vec<Grant>, StoreError>;

    // -- api keys ---------------------------------------------------------

    /// Insert a key; fails `UniqueViolation` on a duplicate name.
    async fn insert_api_key(&self, key: ApiKey) -> Result<(), StoreError>;

    async fn find_api_key_by_hash(&self, secret_hash: &str)
        -> Result<Option<ApiKey>, StoreError>;

    async fn api_keys_for_user(&self, user_id: Uuid) -> Result<Vec<ApiKey>, StoreError>;

    async fn revoke_api_key(&self, id: Uuid, when: DateTime<Utc>) -> Result<(), StoreError>;

    // -- refresh tokens ---------------------------------------------------

    /// Insert a row; fails `UniqueViolation` when the user already holds
    /// one. Under concurrent calls for the same user exactly one insert
    /// wins.
    async fn insert_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError>;

    async fn find_refresh_token(&self, id: Uuid) -> Result<Option<RefreshToken>, StoreError>;

    /// Delete a user's row if present; returns whether a row existed.
    async fn delete_refresh_token_for_user(&self, user_id: Uuid) -> Result<bool, StoreError>;

    /// Single-use rotation: delete `old_id` and insert `replacement` as one
    /// atomic unit. Fails `NotFound` when `old_id` is already gone; on any
    /// failure the old row is left untouched.
    async fn rotate_refresh_token(
        &self,
        old_id: Uuid,
        replacement: RefreshToken,
    ) -> Result<(), StoreError>;

    // -- visa permissions -------------------------------------------------

    async fn insert_visa_permission(&self, permission: VisaPermission) -> Result<(), StoreError>;

    async fn visa_permissions_for(
        &self,
        visa_type: &str,
        visa_value: &str,
    ) -> Result<Vec<VisaPermission>, StoreError>;
}
