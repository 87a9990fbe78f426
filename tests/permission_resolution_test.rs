//! Effective-permission resolution: precedence, defaulting, and the
//! downgrade cleanup cascade.

mod common;

use std::time::Duration;

use authz_core::models::{GrantOwner, Principal, UserStatus};
use authz_core::scopes::{AccessLevel, ScopeSet};
use authz_core::services::{RecordingSink, ServiceError};
use authz_core::store::AuthStore;
use common::{application, approved_user, engine, grant, group, policy};

/// Poll the recording sink until `count` events arrived or a second has
/// passed; publication happens on a detached task.
async fn wait_for_events(sink: &RecordingSink, count: usize) -> Vec<authz_core::services::ApiKeyCleanupRequest> {
    for _ in 0..100 {
        let published = sink.published().await;
        if published.len() >= count {
            return published;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sink.published().await
}

#[tokio::test]
async fn test_group_grant_outranks_weaker_direct_grant() -> anyhow::Result<()> {
    let engine = engine()?;
    let dataset = policy(&engine.store, "dataset-a").await?;
    let g = group(&engine.store, "analysts").await?;
    let user = approved_user(&engine.store, vec![g.id]).await?;

    grant(
        &engine.store,
        GrantOwner::User(user.id),
        dataset.id,
        AccessLevel::Read,
    )
    .await?;
    grant(
        &engine.store,
        GrantOwner::Group(g.id),
        dataset.id,
        AccessLevel::Write,
    )
    .await?;

    let scopes = engine
        .permissions
        .resolve_effective_scopes(&Principal::User(user.id))
        .await?;

    assert_eq!(scopes.len(), 1);
    assert_eq!(scopes.level_for("dataset-a"), Some(AccessLevel::Write));
    Ok(())
}

#[tokio::test]
async fn test_highest_level_wins_across_many_sources() -> anyhow::Result<()> {
    let engine = engine()?;
    let dataset = policy(&engine.store, "dataset-a").await?;
    let g1 = group(&engine.store, "readers").await?;
    let g2 = group(&engine.store, "admins").await?;
    let user = approved_user(&engine.store, vec![g1.id, g2.id]).await?;

    grant(&engine.store, GrantOwner::User(user.id), dataset.id, AccessLevel::Deny).await?;
    grant(&engine.store, GrantOwner::Group(g1.id), dataset.id, AccessLevel::Read).await?;
    grant(&engine.store, GrantOwner::Group(g2.id), dataset.id, AccessLevel::Admin).await?;

    let grants = engine
        .permissions
        .resolve_effective_grants(&Principal::User(user.id))
        .await?;

    // Exactly one winner per policy, at the maximum contributing level.
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].level, AccessLevel::Admin);
    Ok(())
}

#[tokio::test]
async fn test_deny_grant_is_recorded_not_absent() -> anyhow::Result<()> {
    let engine = engine()?;
    let dataset = policy(&engine.store, "dataset-a").await?;
    let user = approved_user(&engine.store, vec![]).await?;

    grant(&engine.store, GrantOwner::User(user.id), dataset.id, AccessLevel::Deny).await?;

    let scopes = engine
        .permissions
        .resolve_effective_scopes(&Principal::User(user.id))
        .await?;

    // A deny grant resolves to a deny scope for that policy, which is not
    // the sentinel default.
    assert!(!scopes.is_default());
    assert_eq!(scopes.level_for("dataset-a"), Some(AccessLevel::Deny));
    Ok(())
}

#[tokio::test]
async fn test_zero_grants_resolve_to_default_scope() -> anyhow::Result<()> {
    let engine = engine()?;
    let user = approved_user(&engine.store, vec![]).await?;

    let scopes = engine
        .permissions
        .resolve_effective_scopes(&Principal::User(user.id))
        .await?;

    assert_eq!(scopes, ScopeSet::default_scope());
    Ok(())
}

#[tokio::test]
async fn test_resolution_is_deterministic_on_equal_levels() -> anyhow::Result<()> {
    let engine = engine()?;
    let dataset = policy(&engine.store, "dataset-a").await?;
    let user = approved_user(&engine.store, vec![]).await?;

    let g1 = grant(&engine.store, GrantOwner::User(user.id), dataset.id, AccessLevel::Write).await?;
    let g2 = grant(&engine.store, GrantOwner::User(user.id), dataset.id, AccessLevel::Write).await?;

    let expected_winner = g1.id.min(g2.id);
    for _ in 0..5 {
        let grants = engine
            .permissions
            .resolve_effective_grants(&Principal::User(user.id))
            .await?;
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].id, expected_winner);
    }
    Ok(())
}

#[tokio::test]
async fn test_application_principal_resolves_its_own_grants() -> anyhow::Result<()> {
    let engine = engine()?;
    let dataset = policy(&engine.store, "dataset-a").await?;
    let app = application(&engine.store, "portal").await?;

    grant(
        &engine.store,
        GrantOwner::Application(app.id),
        dataset.id,
        AccessLevel::Read,
    )
    .await?;

    let scopes = engine
        .permissions
        .resolve_effective_scopes(&Principal::Application(app.id))
        .await?;
    assert_eq!(scopes.level_for("dataset-a"), Some(AccessLevel::Read));
    Ok(())
}

#[tokio::test]
async fn test_unknown_principal_is_not_found() -> anyhow::Result<()> {
    let engine = engine()?;
    let result = engine
        .permissions
        .resolve_effective_scopes(&Principal::User(uuid::Uuid::new_v4()))
        .await;
    assert!(matches!(result, Err(ServiceError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_policy_delete_refused_while_referenced() -> anyhow::Result<()> {
    let engine = engine()?;
    let dataset = policy(&engine.store, "dataset-a").await?;
    let user = approved_user(&engine.store, vec![]).await?;
    let g = grant(&engine.store, GrantOwner::User(user.id), dataset.id, AccessLevel::Read).await?;

    let refused = engine.permissions.delete_policy(dataset.id).await;
    assert!(matches!(refused, Err(ServiceError::UniqueViolation(_))));

    engine.permissions.revoke_grant(g.id).await?;
    engine.permissions.delete_policy(dataset.id).await?;
    Ok(())
}

#[tokio::test]
async fn test_group_downgrade_publishes_cleanup_for_members() -> anyhow::Result<()> {
    let engine = engine()?;
    let dataset = policy(&engine.store, "dataset-a").await?;
    let g = group(&engine.store, "analysts").await?;
    let member_a = approved_user(&engine.store, vec![g.id]).await?;
    let member_b = approved_user(&engine.store, vec![g.id]).await?;
    // Not a member; must not appear in the cleanup request.
    let outsider = approved_user(&engine.store, vec![]).await?;

    let group_grant = grant(
        &engine.store,
        GrantOwner::Group(g.id),
        dataset.id,
        AccessLevel::Write,
    )
    .await?;

    engine
        .permissions
        .change_grant_level(group_grant.id, AccessLevel::Read)
        .await?;

    let published = wait_for_events(&engine.events, 1).await;
    assert_eq!(published.len(), 1);
    assert!(published[0].user_ids.contains(&member_a.id));
    assert!(published[0].user_ids.contains(&member_b.id));
    assert!(!published[0].user_ids.contains(&outsider.id));
    Ok(())
}

#[tokio::test]
async fn test_grant_level_raise_publishes_nothing() -> anyhow::Result<()> {
    let engine = engine()?;
    let dataset = policy(&engine.store, "dataset-a").await?;
    let user = approved_user(&engine.store, vec![]).await?;
    let g = grant(&engine.store, GrantOwner::User(user.id), dataset.id, AccessLevel::Read).await?;

    engine
        .permissions
        .change_grant_level(g.id, AccessLevel::Admin)
        .await?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.events.published().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_deny_grant_revocation_publishes_nothing() -> anyhow::Result<()> {
    let engine = engine()?;
    let dataset = policy(&engine.store, "dataset-a").await?;
    let user = approved_user(&engine.store, vec![]).await?;
    let g = grant(&engine.store, GrantOwner::User(user.id), dataset.id, AccessLevel::Deny).await?;

    // Dropping a deny-level grant can only broaden rights, so no key
    // cleanup is requested.
    engine.permissions.revoke_grant(g.id).await?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.events.published().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_application_grant_revocation_targets_its_users() -> anyhow::Result<()> {
    let engine = engine()?;
    let dataset = policy(&engine.store, "dataset-a").await?;
    let app = application(&engine.store, "portal").await?;

    let mut user = approved_user(&engine.store, vec![]).await?;
    user.application_id = Some(app.id);
    engine.store.insert_user(user.clone()).await?;

    let app_grant = grant(
        &engine.store,
        GrantOwner::Application(app.id),
        dataset.id,
        AccessLevel::Write,
    )
    .await?;

    engine.permissions.revoke_grant(app_grant.id).await?;

    let published = wait_for_events(&engine.events, 1).await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].user_ids, vec![user.id]);
    Ok(())
}

#[tokio::test]
async fn test_suspended_membership_state_does_not_change_resolution() -> anyhow::Result<()> {
    // Resolution is about grants, not status; status gates live at the
    // credential lifecycle layer.
    let engine = engine()?;
    let dataset = policy(&engine.store, "dataset-a").await?;
    let mut user = approved_user(&engine.store, vec![]).await?;
    user.status = UserStatus::Suspended;
    engine.store.insert_user(user.clone()).await?;

    grant(&engine.store, GrantOwner::User(user.id), dataset.id, AccessLevel::Read).await?;

    let scopes = engine
        .permissions
        .resolve_effective_scopes(&Principal::User(user.id))
        .await?;
    assert_eq!(scopes.level_for("dataset-a"), Some(AccessLevel::Read));
    Ok(())
}
