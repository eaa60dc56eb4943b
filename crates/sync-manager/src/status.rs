use chrono::{DateTime, Utc};
use local_store::StorageMode;
use serde::Serialize;

/// Derived engine state published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    /// Unsynced items still eligible for automatic draining.
    pub pending_count: usize,
    /// Unsynced items at max retries.
    pub failed_count: usize,
    pub conflict_count: usize,
    /// End of the last completed drain cycle.
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_mode")]
    pub storage_mode: StorageMode,
}

fn serialize_mode<S: serde::Serializer>(mode: &StorageMode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(match mode {
        StorageMode::Durable => "durable",
        StorageMode::MemoryOnly => "memory_only",
    })
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            is_syncing: false,
            pending_count: 0,
            failed_count: 0,
            conflict_count: 0,
            last_sync_time: None,
            storage_mode: StorageMode::Durable,
        }
    }
}

/// Engine-level problems. Per-item failures never show up here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineFault {
    /// Durable storage was lost; the engine now runs memory-only.
    StorageUnavailable,
    /// A cycle attempted items and none succeeded.
    NoProgress { attempted: usize },
    /// A store call failed for another reason.
    Storage(String),
}

/// Broadcast engine notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Status(SyncStatus),
    Fault(EngineFault),
    ConflictsDetected {
        resource_type: String,
        resource_id: String,
        count: usize,
    },
}

/// Per-cycle tally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Items replayed against the server.
    pub attempted: usize,
    pub succeeded: usize,
    /// Non-retryable failures, now at max retries.
    pub failed: usize,
    /// Retryable failures, rescheduled.
    pub retried: usize,
    /// Not yet due, or queued behind a deferred item on the same resource.
    pub deferred: usize,
    /// Already at max retries.
    pub skipped: usize,
    /// Connectivity dropped before the pending list was exhausted.
    pub stopped_offline: bool,
    /// The cycle could not read the queue.
    pub storage_error: Option<String>,
}

/// Result of asking for a drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Another cycle is active; nothing was started.
    AlreadyRunning,
    /// The device is offline.
    Offline,
    Completed(DrainReport),
}

impl DrainOutcome {
    pub fn report(&self) -> Option<&DrainReport> {
        match self {
            DrainOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}
