//! In-memory [`AuthStore`] used by the test suite and by collaborators
//! that bring no database of their own.
//!
//! One `RwLock` guards all tables, so the uniqueness checks and the
//! delete-old/insert-new rotation step are serialized exactly like the
//! transactional constraints of a relational backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuthStore, StoreError};
use crate::models::{
    ApiKey, Application, Grant, GrantOwner, Group, Policy, RefreshToken, User, VisaPermission,
};
use crate::scopes::AccessLevel;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    groups: HashMap<Uuid, Group>,
    applications: HashMap<Uuid, Application>,
    policies: HashMap<Uuid, Policy>,
    grants: HashMap<Uuid, Grant>,
    api_keys: HashMap<Uuid, ApiKey>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
    visa_permissions: HashMap<Uuid, VisaPermission>,
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        self.tables.write().await.users.insert(user.id, user);
        Ok(())
    }

    async fn touch_last_login(&self, id: Uuid, when: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        user.last_login_utc = Some(when);
        Ok(())
    }

    async fn users_in_group(&self, group_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .filter(|u| u.group_ids.contains(&group_id))
            .map(|u| u.id)
            .collect())
    }

    async fn users_of_application(&self, application_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .filter(|u| u.application_id == Some(application_id))
            .map(|u| u.id)
            .collect())
    }

    async fn insert_group(&self, group: Group) -> Result<(), StoreError> {
        self.tables.write().await.groups.insert(group.id, group);
        Ok(())
    }

    async fn insert_application(&self, application: Application) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .applications
            .values()
            .any(|a| a.client_id == application.client_id)
        {
            return Err(StoreError::UniqueViolation(format!(
                "application client_id {}",
                application.client_id
            )));
        }
        tables.applications.insert(application.id, application);
        Ok(())
    }

    async fn find_application(&self, id: Uuid) -> Result<Option<Application>, StoreError> {
        Ok(self.tables.read().await.applications.get(&id).cloned())
    }

    async fn find_application_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<Application>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .applications
            .values()
            .find(|a| a.client_id == client_id)
            .cloned())
    }

    async fn insert_policy(&self, policy: Policy) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.policies.values().any(|p| p.key == policy.key) {
            return Err(StoreError::UniqueViolation(format!(
                "policy key {}",
                policy.key
            )));
        }
        tables.policies.insert(policy.id, policy);
        Ok(())
    }

    async fn find_policy(&self, id: Uuid) -> Result<Option<Policy>, StoreError> {
        Ok(self.tables.read().await.policies.get(&id).cloned())
    }

    async fn find_policy_by_key(&self, key: &str) -> Result<Option<Policy>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .policies
            .values()
            .find(|p| p.key == key)
            .cloned())
    }

    async fn delete_policy(&self, id: Uuid) -> Result<(), StoreError> {
        // Reference check and delete under one write guard, so a grant
        // inserted concurrently cannot slip past the no-references rule.
        let mut tables = self.tables.write().await;
        if !tables.policies.contains_key(&id) {
            return Err(StoreError::NotFound(format!("policy {id}")));
        }
        let referencing = tables.grants.values().filter(|g| g.policy_id == id).count();
        if referencing > 0 {
            return Err(StoreError::UniqueViolation(format!(
                "policy {id} is referenced by {referencing} grant(s)"
            )));
        }
        tables.policies.remove(&id);
        Ok(())
    }

    async fn insert_grant(&self, grant: Grant) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.policies.contains_key(&grant.policy_id) {
            return Err(StoreError::NotFound(format!("policy {}", grant.policy_id)));
        }
        tables.grants.insert(grant.id, grant);
        Ok(())
    }

    async fn find_grant(&self, id: Uuid) -> Result<Option<Grant>, StoreError> {
        Ok(self.tables.read().await.grants.get(&id).cloned())
    }

    async fn update_grant_level(
        &self,
        id: Uuid,
        level: AccessLevel,
    ) -> Result<Grant, StoreError> {
        let mut tables = self.tables.write().await;
        let grant = tables
            .grants
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("grant {id}")))?;
        grant.level = level;
        Ok(grant.clone())
    }

    async fn delete_grant(&self, id: Uuid) -> Result<Grant, StoreError> {
        self.tables
            .write()
            .await
            .grants
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("grant {id}")))
    }

    async fn grants_for_owner(&self, owner: GrantOwner) -> Result<Vec<Grant>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .grants
            .values()
            .filter(|g| g.owner == owner)
            .cloned()
            .collect())
    }

    async fn insert_api_key(&self, key: ApiKey) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.api_keys.values().any(|k| k.name == key.name) {
            return Err(StoreError::UniqueViolation(format!(
                "api key name {}",
                key.name
            )));
        }
        tables.api_keys.insert(key.id, key);
        Ok(())
    }

    async fn find_api_key_by_hash(
        &self,
        secret_hash: &str,
    ) -> Result<Option<ApiKey>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .api_keys
            .values()
            .find(|k| k.secret_hash == secret_hash)
            .cloned())
    }

    async fn api_keys_for_user(&self, user_id: Uuid) -> Result<Vec<ApiKey>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .api_keys
            .values()
            .filter(|k| k.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn revoke_api_key(&self, id: Uuid, when: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let key = tables
            .api_keys
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("api key {id}")))?;
        if key.revoked_utc.is_none() {
            key.revoked_utc = Some(when);
        }
        Ok(())
    }

    async fn insert_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .refresh_tokens
            .values()
            .any(|t| t.user_id == token.user_id)
        {
            return Err(StoreError::UniqueViolation(format!(
                "refresh token for user {}",
                token.user_id
            )));
        }
        tables.refresh_tokens.insert(token.id, token);
        Ok(())
    }

    async fn find_refresh_token(&self, id: Uuid) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.tables.read().await.refresh_tokens.get(&id).cloned())
    }

    async fn delete_refresh_token_for_user(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.refresh_tokens.len();
        tables.refresh_tokens.retain(|_, t| t.user_id != user_id);
        Ok(tables.refresh_tokens.len() != before)
    }

    async fn rotate_refresh_token(
        &self,
        old_id: Uuid,
        replacement: RefreshToken,
    ) -> Result<(), StoreError> {
        // Single write guard: the delete and insert are observed together
        // or not at all.
        let mut tables = self.tables.write().await;
        let old = tables
            .refresh_tokens
            .remove(&old_id)
            .ok_or_else(|| StoreError::NotFound(format!("refresh token {old_id}")))?;
        if tables
            .refresh_tokens
            .values()
            .any(|t| t.user_id == replacement.user_id)
        {
            // Put the old row back; the uniqueness invariant stands.
            tables.refresh_tokens.insert(old.id, old);
            return Err(StoreError::UniqueViolation(format!(
                "refresh token for user {}",
                replacement.user_id
            )));
        }
        tables.refresh_tokens.insert(replacement.id, replacement);
        Ok(())
    }

    async fn insert_visa_permission(
        &self,
        permission: VisaPermission,
    ) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .visa_permissions
            .insert(permission.id, permission);
        Ok(())
    }

    async fn visa_permissions_for(
        &self,
        visa_type: &str,
        visa_value: &str,
    ) -> Result<Vec<VisaPermission>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .visa_permissions
            .values()
            .filter(|p| p.visa_type == visa_type && p.visa_value == visa_value)
            .cloned()
            .collect())
    }
}
