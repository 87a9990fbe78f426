//! Outbound cleanup events.
//!
//! When grant changes shrink previously-granted scopes, the engine asks a
//! collaborator to revoke or regenerate the affected users' long-lived
//! API keys. The request is fire-and-forget: refresh tokens and in-flight
//! access tokens are untouched and simply age out on their short TTL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Request to clean up long-lived API keys for a set of users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyCleanupRequest {
    pub user_ids: Vec<Uuid>,
    /// Human-readable trigger, for the consumer's logs.
    pub reason: String,
}

/// Fire-and-forget event sink.
#[async_trait]
pub trait CleanupEventSink: Send + Sync {
    async fn publish(&self, request: ApiKeyCleanupRequest);
}

/// Sink that records published requests in memory. Used by the test suite
/// and as a stand-in when no message bus is wired up.
#[derive(Default)]
pub struct RecordingSink {
    published: Mutex<Vec<ApiKeyCleanupRequest>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<ApiKeyCleanupRequest> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl CleanupEventSink for RecordingSink {
    async fn publish(&self, request: ApiKeyCleanupRequest) {
        tracing::info!(
            affected_users = request.user_ids.len(),
            reason = %request.reason,
            "api key cleanup requested"
        );
        self.published.lock().await.push(request);
    }
}
