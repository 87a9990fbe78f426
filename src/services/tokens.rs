//! Access token and API key issuance.

use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{ApiKey, Principal};
use crate::scopes::ScopeSet;
use crate::services::jwt::{AccessTokenClaims, SignedToken, TokenSigner};
use crate::services::permissions::PermissionService;
use crate::services::ServiceError;
use crate::store::AuthStore;

/// A freshly issued API key. The plaintext `key_value` exists only in
/// this value; the store holds its hash.
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub key_value: String,
    pub record: ApiKey,
}

/// Orchestrates issuance of user/application access tokens and opaque
/// long-lived API keys, plus on-demand scope re-validation.
#[derive(Clone)]
pub struct AccessTokenService {
    store: Arc<dyn AuthStore>,
    signer: Arc<TokenSigner>,
    permissions: PermissionService,
    api_key_expiry_days: i64,
}

impl AccessTokenService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        signer: Arc<TokenSigner>,
        permissions: PermissionService,
        api_key_expiry_days: i64,
    ) -> Self {
        Self {
            store,
            signer,
            permissions,
            api_key_expiry_days,
        }
    }

    /// Issue a user access token over the user's current effective scopes.
    /// The last-login timestamp is written on a detached task; issuance
    /// never waits for it.
    pub async fn issue_user_access_token(
        &self,
        user_id: Uuid,
    ) -> Result<SignedToken, ServiceError> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {user_id}")))?;

        let scopes = self
            .permissions
            .resolve_effective_scopes(&Principal::User(user.id))
            .await?;
        let signed = self
            .signer
            .sign_user_token(&user, scopes.to_scope_strings())?;

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.touch_last_login(user_id, Utc::now()).await {
                tracing::warn!(user = %user_id, error = %e, "last-login update failed");
            }
        });

        tracing::info!(user = %user.id, "user access token issued");
        Ok(signed)
    }

    /// Issue an application access token. Scopes are the application's
    /// configured grant types, not resolved policy grants.
    pub async fn issue_application_access_token(
        &self,
        client_id: &str,
    ) -> Result<SignedToken, ServiceError> {
        let application = self
            .store
            .find_application_by_client_id(client_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("application {client_id}")))?;

        if !application.enabled {
            return Err(ServiceError::Forbidden(format!(
                "application {client_id} is disabled"
            )));
        }

        let signed = self.signer.sign_application_token(&application)?;
        tracing::info!(application = %application.id, client_id, "application access token issued");
        Ok(signed)
    }

    /// Issue a persisted API key over `requested` scopes.
    ///
    /// The request must be covered by the owner's current effective
    /// rights. Prior active keys whose scope set is a subset of (or equal
    /// to) the new one are revoked as a side effect, so long-lived keys do
    /// not accumulate without bound.
    pub async fn issue_api_key(
        &self,
        user_id: Uuid,
        name: String,
        requested: ScopeSet,
        allowed_client_ids: Vec<String>,
    ) -> Result<IssuedApiKey, ServiceError> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {user_id}")))?;

        let current = self
            .permissions
            .resolve_effective_scopes(&Principal::User(user_id))
            .await?;
        let missing = current.missing(&requested);
        if !missing.is_empty() {
            return Err(ServiceError::InsufficientScope(missing.to_scope_strings()));
        }

        let key_value = generate_key_value();
        let record = ApiKey::new(
            name,
            user_id,
            &key_value,
            requested.clone(),
            allowed_client_ids,
            self.api_key_expiry_days,
        );
        self.store.insert_api_key(record.clone()).await?;

        // Revoke keys the new one makes redundant.
        let now = Utc::now();
        for prior in self.store.api_keys_for_user(user_id).await? {
            if prior.id != record.id && prior.is_active() && prior.scopes.is_subset_of(&requested)
            {
                self.store.revoke_api_key(prior.id, now).await?;
                tracing::info!(
                    user = %user_id,
                    revoked = %prior.id,
                    superseded_by = %record.id,
                    "redundant api key revoked"
                );
            }
        }

        tracing::info!(user = %user_id, key = %record.id, name = %record.name, "api key issued");
        Ok(IssuedApiKey { key_value, record })
    }

    /// Check an API key and return its live scope: the recorded
    /// issuance-time scopes narrowed by the owner's *current* effective
    /// rights, never just the rights recorded at creation time.
    pub async fn check_api_key(
        &self,
        caller_client_id: Option<&str>,
        key_value: &str,
    ) -> Result<ScopeSet, ServiceError> {
        let hash = ApiKey::hash_key(key_value);
        let key = self
            .store
            .find_api_key_by_hash(&hash)
            .await?
            .ok_or_else(|| ServiceError::NotFound("api key".to_string()))?;

        if !key.is_active() {
            tracing::debug!(key = %key.id, "revoked or expired api key presented");
            return Err(ServiceError::InvalidToken);
        }
        if !key.allows_client(caller_client_id) {
            return Err(ServiceError::Forbidden(
                "api key is not usable by this client application".to_string(),
            ));
        }

        let current = self
            .permissions
            .resolve_effective_scopes(&Principal::User(key.user_id))
            .await?;
        let narrowed = current.narrow(&key.scopes);
        if narrowed.is_empty() {
            return Ok(ScopeSet::default_scope());
        }
        Ok(narrowed)
    }

    /// Signature/expiry check only. Bearer tokens are short-lived by
    /// design, so holder rights are not re-resolved here.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, ServiceError> {
        self.signer.verify(token)
    }
}

/// Opaque API key material: 32 random bytes, hex-encoded.
fn generate_key_value() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}
