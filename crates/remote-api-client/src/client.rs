//! The seam between the sync engine and the server.

use crate::{RemoteFailure, ReplayOutcome};
use async_trait::async_trait;
use serde_json::Value;
use sync_queue::QueuedMutation;

/// Replays queued mutations and fetches current server state.
#[async_trait]
pub trait RemoteApiClient: Send + Sync {
    /// Issue the mutation's method, endpoint and payload exactly as enqueued.
    async fn replay(&self, mutation: &QueuedMutation) -> Result<ReplayOutcome, RemoteFailure>;

    /// Current server value of one resource. `Ok(None)` when it no longer exists.
    ///
    /// Where the resource lives is the client's own convention; the engine
    /// only names the collection and id.
    async fn fetch(&self, collection: &str, id: &str) -> Result<Option<Value>, RemoteFailure>;
}
