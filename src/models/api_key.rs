//! API key model - persisted long-lived credentials.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::scopes::ScopeSet;

/// API key entity. Only the SHA-256 hash of the opaque key value is
/// stored; the plaintext is returned to the caller exactly once at
/// issuance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    /// Unique per deployment, chosen by the owner.
    pub name: String,
    pub user_id: Uuid,
    pub secret_hash: String,
    pub issued_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
    /// Scopes recorded at issuance time. Checks narrow these by the
    /// owner's current rights, never the other way around.
    pub scopes: ScopeSet,
    /// When non-empty, only these client applications may present the key.
    pub allowed_client_ids: Vec<String>,
}

impl ApiKey {
    /// Create a new active key from the plaintext key value.
    pub fn new(
        name: String,
        user_id: Uuid,
        key_value: &str,
        scopes: ScopeSet,
        allowed_client_ids: Vec<String>,
        expiry_days: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            user_id,
            secret_hash: Self::hash_key(key_value),
            issued_utc: now,
            expiry_utc: now + Duration::days(expiry_days),
            revoked_utc: None,
            scopes,
            allowed_client_ids,
        }
    }

    /// Hash a key value with SHA-256.
    pub fn hash_key(key_value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key_value.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expiry_utc
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_utc.is_some()
    }

    /// Check if the key is active (not expired, not revoked).
    pub fn is_active(&self) -> bool {
        !self.is_expired() && !self.is_revoked()
    }

    /// Check if a calling application may present this key. Keys without
    /// a restriction list are usable by any client.
    pub fn allows_client(&self, client_id: Option<&str>) -> bool {
        if self.allowed_client_ids.is_empty() {
            return true;
        }
        match client_id {
            Some(id) => self.allowed_client_ids.iter().any(|c| c == id),
            None => false,
        }
    }
}
