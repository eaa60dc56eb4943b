//! Scenario tests for the sync engine.
//!
//! - `harness.rs`     - scripted remote client and engine fixture
//! - `ordering.rs`    - enqueue order, per-resource ordering, offline stop
//! - `retry.rs`       - retryable and terminal failures, backoff, retry_failed
//! - `concurrency.rs` - single active drain, background triggers
//! - `conflicts.rs`   - detection on fresh server data and resolution
//! - `retention.rs`   - retain-for-audit vs purge-on-success, cache baselines
//! - `storage.rs`     - durability across restarts and memory-only fallback

mod ordering;
mod retry;
