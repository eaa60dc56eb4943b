use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happens to a queue record once the server accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Keep it with `synced = true` so it stays inspectable.
    #[default]
    RetainForAudit,
    /// Delete it in the same transaction that marks it done.
    PurgeOnSuccess,
}

/// Drain and retry policy.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Attempts before an item is excluded from automatic draining.
    pub max_retries: u32,
    /// Delay before the first retry. Doubles per retry.
    pub base_backoff: Duration,
    /// Cap on the retry delay.
    pub max_backoff: Duration,
    pub retention: RetentionPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(2000),
            max_backoff: Duration::from_millis(60_000),
            retention: RetentionPolicy::RetainForAudit,
        }
    }
}
