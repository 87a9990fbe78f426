//! Effective-permission resolution and grant administration.

use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Grant, GrantOwner, Policy, Principal};
use crate::scopes::{AccessLevel, Scope, ScopeSet};
use crate::services::events::{ApiKeyCleanupRequest, CleanupEventSink};
use crate::services::ServiceError;
use crate::store::AuthStore;

/// Aggregates a principal's direct and inherited grants into one canonical
/// effective-permission set, and owns the grant mutations that trigger the
/// downgrade cleanup cascade.
#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn AuthStore>,
    events: Arc<dyn CleanupEventSink>,
}

impl PermissionService {
    pub fn new(store: Arc<dyn AuthStore>, events: Arc<dyn CleanupEventSink>) -> Self {
        Self { store, events }
    }

    /// Resolve a principal's effective grants: one winning grant per
    /// policy.
    ///
    /// Sources are the principal's own grants plus, for users, the grants
    /// of every group the user belongs to. Where several grants target the
    /// same policy the strictly-highest access level wins ("most generous
    /// applicable grant wins"); a deny-level grant beats only the absence
    /// of a grant. Ties at equal level break on grant id, so resolution is
    /// deterministic. A deny-suppresses-all reading would invert the
    /// comparison here and nowhere else.
    pub async fn resolve_effective_grants(
        &self,
        principal: &Principal,
    ) -> Result<Vec<Grant>, ServiceError> {
        let mut candidates: Vec<Grant> = Vec::new();

        match principal {
            Principal::User(user_id) => {
                let user = self
                    .store
                    .find_user(*user_id)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("user {user_id}")))?;

                candidates.extend(
                    self.store
                        .grants_for_owner(GrantOwner::User(user.id))
                        .await?,
                );
                for group_id in &user.group_ids {
                    candidates.extend(
                        self.store
                            .grants_for_owner(GrantOwner::Group(*group_id))
                            .await?,
                    );
                }
            }
            Principal::Application(app_id) => {
                self.store
                    .find_application(*app_id)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("application {app_id}")))?;

                candidates.extend(
                    self.store
                        .grants_for_owner(GrantOwner::Application(*app_id))
                        .await?,
                );
            }
        }

        let mut winners: HashMap<Uuid, Grant> = HashMap::new();
        for grant in candidates {
            let replace = match winners.get(&grant.policy_id) {
                None => true,
                Some(current) => {
                    grant.level > current.level
                        || (grant.level == current.level && grant.id < current.id)
                }
            };
            if replace {
                winners.insert(grant.policy_id, grant);
            }
        }

        let mut resolved: Vec<Grant> = winners.into_values().collect();
        resolved.sort_by_key(|g| g.policy_id);
        Ok(resolved)
    }

    /// Resolve a principal's effective scope set, substituting the
    /// sentinel no-access scope when zero grants apply.
    pub async fn resolve_effective_scopes(
        &self,
        principal: &Principal,
    ) -> Result<ScopeSet, ServiceError> {
        let grants = self.resolve_effective_grants(principal).await?;
        let scopes = scope_set_for(
            self.store.as_ref(),
            grants.iter().map(|g| (g.policy_id, g.level)),
        )
        .await?;

        if scopes.is_empty() {
            tracing::debug!(principal = %principal.id(), "principal resolved to zero grants");
            return Ok(ScopeSet::default_scope());
        }
        Ok(scopes)
    }

    // -- policy / grant administration ------------------------------------

    /// Create a policy; the key must be unique.
    pub async fn create_policy(
        &self,
        key: String,
        description: Option<String>,
    ) -> Result<Policy, ServiceError> {
        let policy = Policy::new(key, description);
        self.store.insert_policy(policy.clone()).await?;
        tracing::info!(policy = %policy.key, "policy created");
        Ok(policy)
    }

    /// Delete a policy. The store refuses the delete while any grant
    /// references it, atomically with the reference check.
    pub async fn delete_policy(&self, policy_id: Uuid) -> Result<(), ServiceError> {
        self.store.delete_policy(policy_id).await?;
        tracing::info!(policy = %policy_id, "policy deleted");
        Ok(())
    }

    /// Record a grant for an owner on a policy.
    pub async fn add_grant(
        &self,
        owner: GrantOwner,
        policy_id: Uuid,
        level: AccessLevel,
    ) -> Result<Grant, ServiceError> {
        let grant = Grant::new(owner, policy_id, level);
        self.store.insert_grant(grant.clone()).await?;
        tracing::info!(
            grant = %grant.id,
            owner_kind = grant.owner.kind(),
            owner = %grant.owner.id(),
            level = %grant.level,
            "grant added"
        );
        Ok(grant)
    }

    /// Change a grant's access level. Lowering the level shrinks rights
    /// for everyone the owner covers, so a cleanup request is published
    /// for the affected users.
    pub async fn change_grant_level(
        &self,
        grant_id: Uuid,
        level: AccessLevel,
    ) -> Result<Grant, ServiceError> {
        let before = self
            .store
            .find_grant(grant_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("grant {grant_id}")))?;
        let updated = self.store.update_grant_level(grant_id, level).await?;

        if level < before.level {
            self.request_cleanup(before.owner, "grant level lowered")
                .await?;
        }
        Ok(updated)
    }

    /// Remove a grant and publish cleanup for the users it covered.
    /// Removing a deny-level grant cannot shrink anyone's rights, so it
    /// publishes nothing.
    pub async fn revoke_grant(&self, grant_id: Uuid) -> Result<Grant, ServiceError> {
        let removed = self.store.delete_grant(grant_id).await?;
        if removed.level > AccessLevel::Deny {
            self.request_cleanup(removed.owner, "grant revoked").await?;
        }
        Ok(removed)
    }

    /// Publish an ApiKey cleanup request for every user a grant owner
    /// covers. Fire-and-forget: issuance paths never wait on the consumer.
    async fn request_cleanup(
        &self,
        owner: GrantOwner,
        reason: &str,
    ) -> Result<(), ServiceError> {
        let user_ids = match owner {
            GrantOwner::User(id) => vec![id],
            GrantOwner::Group(id) => self.store.users_in_group(id).await?,
            GrantOwner::Application(id) => self.store.users_of_application(id).await?,
            // Visa grants never feed persisted API keys; nothing to clean.
            GrantOwner::Visa(_) => Vec::new(),
        };
        if user_ids.is_empty() {
            return Ok(());
        }

        let events = Arc::clone(&self.events);
        let request = ApiKeyCleanupRequest {
            user_ids,
            reason: reason.to_string(),
        };
        tokio::spawn(async move {
            events.publish(request).await;
        });
        Ok(())
    }
}

/// Look up policy keys and assemble a scope set from (policy id, level)
/// pairs. A pair referencing a missing policy is a broken cascade and
/// surfaces as an internal error rather than being silently dropped.
pub(crate) async fn scope_set_for<I>(
    store: &dyn AuthStore,
    entries: I,
) -> Result<ScopeSet, ServiceError>
where
    I: IntoIterator<Item = (Uuid, AccessLevel)>,
{
    let mut scopes = ScopeSet::new();
    for (policy_id, level) in entries {
        let policy = store
            .find_policy(policy_id)
            .await?
            .ok_or_else(|| {
                ServiceError::Internal(anyhow::anyhow!(
                    "grant references missing policy {policy_id}"
                ))
            })?;
        scopes.insert_max(Scope::new(policy.key, level));
    }
    Ok(scopes)
}
