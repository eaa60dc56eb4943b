use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Wall-clock time that advances with the tokio timer.
///
/// Anchored once, then moved forward by tokio's monotonic clock, so
/// persisted retry instants and the retry timer agree even when the
/// runtime's time is paused.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Clock {
    wall: DateTime<Utc>,
    anchor: Instant,
}

impl Clock {
    pub(crate) fn new() -> Self {
        Self {
            wall: Utc::now(),
            anchor: Instant::now(),
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }

    /// Time left until `at`, zero if it already passed.
    pub(crate) fn until(&self, at: DateTime<Utc>) -> std::time::Duration {
        (at - self.now()).to_std().unwrap_or_default()
    }
}
