//! Refresh session management.
//!
//! One non-deleted refresh token per user, single-use rotation, and
//! cascading revocation. The store's uniqueness constraint is the source
//! of truth for the one-token invariant; concurrent session creations for
//! the same user race and exactly one wins.

use std::sync::Arc;
use uuid::Uuid;

use crate::models::{RefreshToken, User};
use crate::services::jwt::{AccessTokenClaims, TokenSigner};
use crate::services::tokens::AccessTokenService;
use crate::services::ServiceError;
use crate::store::AuthStore;

/// Bundle returned when a refresh session is opened.
#[derive(Debug, Clone)]
pub struct RefreshContext {
    pub refresh_token: RefreshToken,
    pub claims: AccessTokenClaims,
    pub user: User,
}

/// Owns the per-user refresh state machine:
/// NONE → ACTIVE → (ROTATED → ACTIVE) | REVOKED.
#[derive(Clone)]
pub struct RefreshSessionService {
    store: Arc<dyn AuthStore>,
    signer: Arc<TokenSigner>,
    tokens: AccessTokenService,
    refresh_token_expiry_days: i64,
}

impl RefreshSessionService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        signer: Arc<TokenSigner>,
        tokens: AccessTokenService,
        refresh_token_expiry_days: i64,
    ) -> Self {
        Self {
            store,
            signer,
            tokens,
            refresh_token_expiry_days,
        }
    }

    /// Open a refresh session for the holder of a freshly issued access
    /// token. The new row is bound to that token's jti; an approved status
    /// and the absence of an existing row are preconditions.
    pub async fn create_initial(
        &self,
        user_access_token: &str,
    ) -> Result<RefreshContext, ServiceError> {
        let claims = self.signer.verify(user_access_token)?;
        let user = self.user_for_claims(&claims).await?;

        if !user.is_approved() {
            return Err(ServiceError::Forbidden(format!(
                "user {} is not approved",
                user.id
            )));
        }

        let refresh_token =
            RefreshToken::new(user.id, claims.jti.clone(), self.refresh_token_expiry_days);
        // The store's per-user uniqueness constraint decides the race.
        self.store.insert_refresh_token(refresh_token.clone()).await?;

        tracing::info!(user = %user.id, refresh = %refresh_token.id, "refresh session opened");
        Ok(RefreshContext {
            refresh_token,
            claims,
            user,
        })
    }

    /// Rotate a refresh token: the presented access token must be the one
    /// the row was minted alongside (jti binding), the owner must still be
    /// approved, and the delete-old/insert-new step is one atomic store
    /// operation. Returns the newly signed access token.
    pub async fn validate_and_rotate(
        &self,
        incoming_refresh_id: Uuid,
        incoming_access_token: &str,
    ) -> Result<String, ServiceError> {
        let stored = self
            .store
            .find_refresh_token(incoming_refresh_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("refresh token {incoming_refresh_id}"))
            })?;

        // Signature must hold; expiry of the paired access token is
        // expected and skipped.
        let claims = self.signer.claims_for_rotation(incoming_access_token)?;
        if claims.jti != stored.jti {
            tracing::warn!(
                refresh = %stored.id,
                user = %stored.user_id,
                "refresh rotation presented a foreign access token"
            );
            return Err(ServiceError::Forbidden("invalid claims".to_string()));
        }
        if stored.is_expired() {
            return Err(ServiceError::InvalidToken);
        }

        let user = self
            .store
            .find_user(stored.user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", stored.user_id)))?;
        if !user.is_approved() {
            return Err(ServiceError::Forbidden(format!(
                "user {} is not approved",
                user.id
            )));
        }

        let new_access = self.tokens.issue_user_access_token(user.id).await?;
        let replacement = RefreshToken::new(
            user.id,
            new_access.claims.jti.clone(),
            self.refresh_token_expiry_days,
        );
        self.store
            .rotate_refresh_token(stored.id, replacement)
            .await?;

        tracing::info!(user = %user.id, "refresh token rotated");
        Ok(new_access.token)
    }

    /// Revoke the token holder's refresh session. Idempotent: the absence
    /// of a session is not an error.
    pub async fn revoke(&self, user_access_token: &str) -> Result<(), ServiceError> {
        let claims = self.signer.verify(user_access_token)?;
        let user = self.user_for_claims(&claims).await?;

        let existed = self.store.delete_refresh_token_for_user(user.id).await?;
        if existed {
            tracing::info!(user = %user.id, "refresh session revoked");
        }
        Ok(())
    }

    async fn user_for_claims(&self, claims: &AccessTokenClaims) -> Result<User, ServiceError> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| ServiceError::InvalidToken)?;
        self.store
            .find_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {user_id}")))
    }
}
