//! Refresh token model - single-use rotation state, one row per user.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Refresh token entity. The store enforces at most one non-deleted row
/// per user; rotation deletes this row and inserts a replacement in one
/// atomic unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Claims id of the access token this row was minted alongside. An
    /// incoming rotation must present exactly that access token.
    pub jti: String,
    pub issued_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
}

impl RefreshToken {
    /// Create a new refresh token bound to an access token's jti.
    pub fn new(user_id: Uuid, jti: String, expiry_days: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            jti,
            issued_utc: now,
            expiry_utc: now + Duration::days(expiry_days),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expiry_utc
    }
}
