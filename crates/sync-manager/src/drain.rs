//! One drain cycle over the pending queue.

use crate::backoff::{compute_backoff, next_wake};
use crate::fresh::ends_in_delete;
use crate::manager::Trigger;
use crate::status::{DrainReport, EngineFault};
use crate::{RetentionPolicy, SyncManager, SyncResult};
use entity_cache::{fields, ops as cache_ops};
use remote_api_client::{RemoteFailure, ReplayOutcome};
use serde_json::Value;
use std::collections::HashSet;
use sync_queue::{ops as queue_ops, OperationType, QueuedMutation};
use tracing::{debug, info, warn};

type ResourceKey = (String, String);

impl SyncManager {
    /// Replay pending items in ascending id order.
    ///
    /// The pending list is read once, so items enqueued while the cycle runs
    /// wait for the next one. Each item is re-read before it is processed.
    pub(crate) async fn run_cycle(&self) -> DrainReport {
        let mut report = DrainReport::default();
        let max_retries = self.inner.settings.max_retries;

        let pending = match self.inner.queue.list_pending().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Failed to read pending mutations");
                self.report_storage_fault();
                report.storage_error = Some(e.to_string());
                return report;
            }
        };
        info!(count = pending.len(), "Drain cycle started");

        // Resources whose earlier item is still waiting; later items must not overtake it.
        let mut blocked: HashSet<ResourceKey> = HashSet::new();

        for listed in pending {
            if !self.inner.connectivity.is_online() {
                info!(next_id = listed.id, "Went offline, stopping drain");
                report.stopped_offline = true;
                break;
            }

            let item = match self.inner.queue.get(listed.id).await {
                Ok(Some(item)) if !item.synced => item,
                Ok(_) => {
                    debug!(id = listed.id, "Mutation settled elsewhere, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(id = listed.id, error = %e, "Failed to reload mutation");
                    self.report_storage_fault();
                    report.storage_error = Some(e.to_string());
                    break;
                }
            };

            if item.is_failed(max_retries) {
                debug!(
                    id = item.id,
                    retry_count = item.retry_count,
                    max_retries,
                    "Skipping mutation (max retries reached)"
                );
                report.skipped += 1;
                continue;
            }

            let key: Option<ResourceKey> = item
                .resource_key()
                .map(|(collection, id)| (collection.to_string(), id.to_string()));
            if key.as_ref().is_some_and(|k| blocked.contains(k)) {
                debug!(id = item.id, "Deferring mutation behind earlier one on the same resource");
                report.deferred += 1;
                continue;
            }
            if let Some((collection, id)) = &key {
                match self.inner.conflicts.list_for_resource(collection, id).await {
                    Ok(open) if !open.is_empty() => {
                        debug!(
                            id = item.id,
                            conflicts = open.len(),
                            "Holding mutation until its conflicts are resolved"
                        );
                        report.deferred += 1;
                        blocked.insert((collection.clone(), id.clone()));
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(id = item.id, error = %e, "Failed to read open conflicts");
                        self.report_storage_fault();
                        report.storage_error = Some(e.to_string());
                        break;
                    }
                }
            }
            if !item.is_due(self.inner.clock.now()) {
                debug!(id = item.id, next_attempt_at = ?item.next_attempt_at, "Mutation not due yet");
                report.deferred += 1;
                if let Some(key) = key {
                    blocked.insert(key);
                }
                continue;
            }

            report.attempted += 1;
            let handled = match self.inner.api.replay(&item).await {
                Ok(outcome) => self.on_success(&item, outcome).await.map(|()| {
                    report.succeeded += 1;
                }),
                Err(failure) if !failure.retryable => {
                    let result = self.on_terminal(&item, &failure).await.map(|()| {
                        report.failed += 1;
                    });
                    if result.is_ok() && failure.is_conflict_rejection() {
                        if let Some((collection, id)) = &key {
                            if let Err(e) = self.refresh_resource(collection, id).await {
                                warn!(
                                    collection = %collection,
                                    resource_id = %id,
                                    error = %e,
                                    "Refetch after conflict rejection failed"
                                );
                            }
                        }
                    }
                    result
                }
                Err(failure) => self.on_retryable(&item, &failure).await.map(|()| {
                    report.retried += 1;
                    if let Some(key) = key {
                        blocked.insert(key);
                    }
                }),
            };

            if let Err(e) = handled {
                // The server outcome is lost; the item replays on a later cycle.
                warn!(id = item.id, error = %e, "Failed to record mutation outcome");
                self.report_storage_fault();
                report.storage_error = Some(e.to_string());
                break;
            }
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            retried = report.retried,
            deferred = report.deferred,
            skipped = report.skipped,
            stopped_offline = report.stopped_offline,
            "Drain cycle finished"
        );
        report
    }

    /// Settle the queue record and refresh the cache in one transaction.
    async fn on_success(&self, item: &QueuedMutation, outcome: ReplayOutcome) -> SyncResult<()> {
        let retention = self.inner.settings.retention;
        let item = item.clone();
        let id = item.id;

        self.inner
            .store
            .transaction(move |tx| {
                match retention {
                    RetentionPolicy::RetainForAudit => {
                        queue_ops::mark_synced(tx, item.id)?;
                    }
                    RetentionPolicy::PurgeOnSuccess => {
                        queue_ops::remove(tx, item.id)?;
                    }
                }

                let Some(resource_id) = resource_id(&item, outcome.resource.as_ref()) else {
                    return Ok(());
                };
                let collection = item.target_collection.as_str();
                if item.operation_type == OperationType::Delete {
                    cache_ops::remove(tx, collection, &resource_id)?;
                    return Ok(());
                }

                let others: Vec<QueuedMutation> =
                    queue_ops::pending_for_resource(tx, collection, &resource_id)?
                        .into_iter()
                        .filter(|m| m.id != item.id)
                        .collect();
                if ends_in_delete(&others) {
                    return Ok(());
                }
                let others_pending = !others.is_empty();

                match outcome.resource {
                    Some(resource) if !others_pending => {
                        cache_ops::put_synced(tx, collection, &resource_id, resource)?;
                    }
                    Some(resource) => {
                        // Later local edits stay live; only the baseline moves.
                        if cache_ops::set_baseline(tx, collection, &resource_id, Some(resource.clone()))?
                            .is_none()
                        {
                            cache_ops::put_synced(tx, collection, &resource_id, resource)?;
                        }
                    }
                    None => {
                        let Some(entity) = cache_ops::get(tx, collection, &resource_id)? else {
                            return Ok(());
                        };
                        let baseline = if others_pending {
                            fields::merge(&entity.baseline.unwrap_or(Value::Null), &item.payload)
                        } else {
                            entity.payload
                        };
                        cache_ops::set_baseline(tx, collection, &resource_id, Some(baseline))?;
                    }
                }
                Ok(())
            })
            .await?;

        debug!(id, "Mutation synced");
        Ok(())
    }

    /// Fail fast: the item goes straight to max retries.
    async fn on_terminal(&self, item: &QueuedMutation, failure: &RemoteFailure) -> SyncResult<()> {
        let id = item.id;
        let max_retries = self.inner.settings.max_retries;
        let message = failure.to_string();
        warn!(
            id,
            status = ?failure.status,
            category = ?failure.category,
            error = %failure.message,
            "Mutation rejected, marking failed"
        );
        self.inner
            .store
            .transaction(move |tx| queue_ops::mark_failed(tx, id, max_retries, &message))
            .await?;
        Ok(())
    }

    /// Count the attempt and schedule the next one.
    async fn on_retryable(&self, item: &QueuedMutation, failure: &RemoteFailure) -> SyncResult<()> {
        let id = item.id;
        let settings = &self.inner.settings;
        let max_retries = settings.max_retries;
        let retry_count = item.retry_count.saturating_add(1).min(max_retries);
        let next_attempt_at = self.inner.clock.now() + compute_backoff(retry_count, settings);
        let message = failure.to_string();

        warn!(
            id,
            retry_count,
            max_retries,
            next_attempt_at = %next_attempt_at,
            error = %failure,
            "Mutation replay failed, will retry"
        );
        self.inner
            .store
            .transaction(move |tx| {
                queue_ops::increment_retry(tx, id, max_retries, Some(next_attempt_at), &message)
            })
            .await?;
        Ok(())
    }

    /// Publish the new status, report faults and arm the retry timer.
    pub(crate) async fn after_cycle(&self, report: &DrainReport) {
        self.publish_status().await;

        if report.attempted > 0 && report.succeeded == 0 {
            self.fault(EngineFault::NoProgress {
                attempted: report.attempted,
            });
        }
        if let Some(error) = &report.storage_error {
            self.fault(EngineFault::Storage(error.clone()));
            return;
        }
        if report.stopped_offline {
            // The next online transition drains again.
            return;
        }
        self.arm_retry_timer().await;
    }

    /// One timer for the earliest instant a cycle has work again.
    async fn arm_retry_timer(&self) {
        let pending = match self.inner.queue.list_pending().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Failed to read pending mutations for retry timer");
                return;
            }
        };

        let held: HashSet<ResourceKey> = match self.inner.conflicts.list().await {
            Ok(open) => open
                .into_iter()
                .map(|c| (c.resource_type, c.resource_id))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to read open conflicts for retry timer");
                return;
            }
        };

        let wake = next_wake(
            &pending,
            &held,
            self.inner.clock.now(),
            self.inner.settings.max_retries,
        );
        let mut slot = self.inner.retry_timer.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        let Some(at) = wake else {
            return;
        };

        let delay = self.inner.clock.until(at);
        let trigger_tx = self.inner.trigger_tx.clone();
        debug!(delay_ms = delay.as_millis() as u64, "Retry timer armed");
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = trigger_tx.send(Trigger::RetryTimer).await;
        }));
    }
}

/// Resource a successful mutation settles. Creates without a target id
/// take the id the server assigned.
fn resource_id(item: &QueuedMutation, resource: Option<&Value>) -> Option<String> {
    if let Some(id) = &item.target_id {
        return Some(id.clone());
    }
    match resource?.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
