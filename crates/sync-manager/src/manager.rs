//! Sync manager: owns the drain guard, triggers and status publication.

use crate::clock::Clock;
use crate::status::{DrainOutcome, EngineFault, SyncEvent, SyncStatus};
use crate::{SyncError, SyncResult, SyncSettings};
use conflict_coordinator::{BulkResolution, ConflictCoordinator, DataConflict, Resolution};
use connectivity_monitor::{ConnectivitySignal, Transition};
use entity_cache::{ops as cache_ops, EntityCache};
use local_store::{StorageMode, Store};
use parking_lot::Mutex;
use remote_api_client::RemoteApiClient;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use sync_queue::{ops as queue_ops, NewMutation, OperationType, QueuedMutation, SyncQueue};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default capacity of the trigger channel.
const TRIGGER_CAPACITY: usize = 64;

/// Why a background drain was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    Enqueued,
    RetryTimer,
    Resolved,
}

pub(crate) struct Inner {
    pub(crate) store: Store,
    pub(crate) queue: SyncQueue,
    pub(crate) cache: EntityCache,
    pub(crate) conflicts: ConflictCoordinator,
    pub(crate) api: Arc<dyn RemoteApiClient>,
    pub(crate) connectivity: Arc<dyn ConnectivitySignal>,
    pub(crate) settings: SyncSettings,
    pub(crate) clock: Clock,
    /// Set while a drain cycle runs. The only lock around draining.
    pub(crate) draining: AtomicBool,
    pub(crate) last_sync_time: Mutex<Option<chrono::DateTime<chrono::Utc>>>,
    pub(crate) status_tx: watch::Sender<SyncStatus>,
    pub(crate) event_tx: broadcast::Sender<SyncEvent>,
    pub(crate) trigger_tx: mpsc::Sender<Trigger>,
    trigger_rx: Mutex<Option<mpsc::Receiver<Trigger>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pub(crate) retry_timer: Mutex<Option<JoinHandle<()>>>,
    storage_fault_reported: AtomicBool,
}

/// Offline-first sync engine.
///
/// Constructed explicitly with its collaborators; clones share one engine.
///
/// # Lifecycle
///
/// 1. Open a [`Store`] with [`crate::engine_schemas`].
/// 2. Create with [`SyncManager::new`].
/// 3. Call [`SyncManager::start`] so online transitions, enqueues and retry
///    timers trigger drains in the background.
/// 4. Call [`SyncManager::sync`] for a manual drain at any time.
#[derive(Clone)]
pub struct SyncManager {
    pub(crate) inner: Arc<Inner>,
}

/// Clears the drain flag when a cycle ends, however it ends.
pub(crate) struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncManager {
    pub async fn new(
        store: Store,
        api: Arc<dyn RemoteApiClient>,
        connectivity: Arc<dyn ConnectivitySignal>,
        settings: SyncSettings,
    ) -> SyncResult<Self> {
        let conflicts = ConflictCoordinator::open(store.clone()).await?;
        let queue = SyncQueue::new(store.clone());
        let counts = queue.counts(settings.max_retries).await?;

        let initial = SyncStatus {
            is_syncing: false,
            pending_count: counts.pending,
            failed_count: counts.failed,
            conflict_count: conflicts.subscribe().borrow().len(),
            last_sync_time: None,
            storage_mode: store.mode(),
        };
        let (status_tx, _) = watch::channel(initial);
        let (event_tx, _) = broadcast::channel(100);
        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_CAPACITY);

        info!(
            pending = counts.pending,
            failed = counts.failed,
            max_retries = settings.max_retries,
            "Sync manager created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                cache: EntityCache::new(store.clone()),
                queue,
                conflicts,
                store,
                api,
                connectivity,
                settings,
                clock: Clock::new(),
                draining: AtomicBool::new(false),
                last_sync_time: Mutex::new(None),
                status_tx,
                event_tx,
                trigger_tx,
                trigger_rx: Mutex::new(Some(trigger_rx)),
                worker: Mutex::new(None),
                retry_timer: Mutex::new(None),
                storage_fault_reported: AtomicBool::new(false),
            }),
        })
    }

    /// Spawn the background worker. Calling it again does nothing.
    ///
    /// The worker drains on every online transition, on enqueue while
    /// online, and when the retry timer fires.
    pub fn start(&self) {
        let Some(mut trigger_rx) = self.inner.trigger_rx.lock().take() else {
            debug!("Sync manager already started");
            return;
        };
        let mut transitions = self.inner.connectivity.subscribe();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            loop {
                let reason = tokio::select! {
                    trigger = trigger_rx.recv() => match trigger {
                        Some(trigger) => format!("{trigger:?}"),
                        None => break,
                    },
                    transition = transitions.recv() => match transition {
                        Ok(Transition::WentOnline) => "WentOnline".to_string(),
                        Ok(Transition::WentOffline) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "Connectivity events lagged");
                            "Lagged".to_string()
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };

                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let manager = SyncManager { inner };
                debug!(reason = %reason, "Drain triggered");
                manager.sync().await;
            }
            debug!("Sync worker stopped");
        });

        *self.inner.worker.lock() = Some(handle);
        info!("Sync manager started");
    }

    /// Stop the background worker and any pending retry timer.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.worker.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.inner.retry_timer.lock().take() {
            handle.abort();
        }
    }

    /// Run one drain cycle now.
    ///
    /// Returns without doing anything when offline or when a cycle is
    /// already running. Never fails: per-item problems are recorded in
    /// queue state and engine problems are broadcast as faults.
    pub async fn sync(&self) -> DrainOutcome {
        if !self.inner.connectivity.is_online() {
            debug!("Sync requested while offline");
            return DrainOutcome::Offline;
        }
        if self
            .inner
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync already running");
            return DrainOutcome::AlreadyRunning;
        }

        let report = {
            let _guard = DrainGuard(&self.inner.draining);
            self.publish_status().await;
            self.run_cycle().await
        };

        *self.inner.last_sync_time.lock() = Some(self.inner.clock.now());
        self.after_cycle(&report).await;
        DrainOutcome::Completed(report)
    }

    /// Optimistically update the cache and durably enqueue, in one transaction.
    ///
    /// For deletes the cached entity is removed. When online a background
    /// drain is requested.
    pub async fn enqueue(
        &self,
        mutation: NewMutation,
        optimistic: Option<Value>,
    ) -> SyncResult<QueuedMutation> {
        let queued = match self.enqueue_once(mutation.clone(), optimistic.clone()).await {
            Err(SyncError::Store(e)) if e.is_storage_unavailable() => {
                // The store has switched to memory; the write goes there instead.
                self.report_storage_fault();
                self.enqueue_once(mutation, optimistic).await?
            }
            other => other?,
        };

        self.publish_status().await;
        if self.inner.connectivity.is_online() {
            self.request_drain(Trigger::Enqueued);
        }
        Ok(queued)
    }

    async fn enqueue_once(
        &self,
        mutation: NewMutation,
        optimistic: Option<Value>,
    ) -> SyncResult<QueuedMutation> {
        Ok(self
            .inner
            .store
            .transaction(move |tx| {
                if let Some(id) = mutation.target_id.as_deref() {
                    let collection = mutation.target_collection.as_str();
                    if mutation.operation_type == OperationType::Delete {
                        cache_ops::remove(tx, collection, id)?;
                    } else if let Some(value) = optimistic {
                        cache_ops::apply_local(tx, collection, id, value)?;
                    }
                }
                queue_ops::enqueue(tx, mutation)
            })
            .await?)
    }

    /// Reset every failed item and run a drain.
    pub async fn retry_failed(&self) -> SyncResult<DrainOutcome> {
        let reset = self.inner.queue.reset_failed(self.inner.settings.max_retries).await?;
        info!(count = reset.len(), "Retrying failed items");
        self.publish_status().await;
        Ok(self.sync().await)
    }

    /// Manually drop a queued mutation.
    pub async fn discard(&self, id: i64) -> SyncResult<()> {
        self.inner.queue.remove(id).await?;
        self.publish_status().await;
        Ok(())
    }

    /// Delete retained synced records.
    pub async fn purge_synced(&self) -> SyncResult<usize> {
        Ok(self.inner.queue.purge_synced().await?)
    }

    pub async fn get_failed_items(&self) -> SyncResult<Vec<QueuedMutation>> {
        Ok(self.inner.queue.list_failed(self.inner.settings.max_retries).await?)
    }

    /// Unsynced items, failed ones included, ascending by id.
    pub async fn get_pending_items(&self) -> SyncResult<Vec<QueuedMutation>> {
        Ok(self.inner.queue.list_pending().await?)
    }

    pub async fn resolve_conflict(&self, id: &str, resolution: Resolution<'_>) -> SyncResult<()> {
        self.inner.conflicts.resolve_one(id, resolution).await?;
        self.after_resolution().await;
        Ok(())
    }

    pub async fn resolve_all_conflicts(&self, resolution: BulkResolution) -> SyncResult<usize> {
        let count = self.inner.conflicts.resolve_all(resolution).await?;
        self.after_resolution().await;
        Ok(count)
    }

    async fn after_resolution(&self) {
        self.publish_status().await;
        if self.inner.connectivity.is_online() {
            self.request_drain(Trigger::Resolved);
        }
    }

    pub async fn conflicts(&self) -> SyncResult<Vec<DataConflict>> {
        Ok(self.inner.conflicts.list().await?)
    }

    pub fn subscribe_conflicts(&self) -> watch::Receiver<Vec<DataConflict>> {
        self.inner.conflicts.subscribe()
    }

    /// Last published status.
    pub fn status(&self) -> SyncStatus {
        self.inner.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.draining.load(Ordering::Acquire)
    }

    pub fn cache(&self) -> &EntityCache {
        &self.inner.cache
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.inner.queue
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.inner.store.mode()
    }

    pub(crate) fn request_drain(&self, trigger: Trigger) {
        if let Err(e) = self.inner.trigger_tx.try_send(trigger) {
            // A full channel already has a drain pending.
            debug!(error = %e, "Drain trigger dropped");
        }
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    pub(crate) fn fault(&self, fault: EngineFault) {
        warn!(?fault, "Sync engine fault");
        self.emit(SyncEvent::Fault(fault));
    }

    /// Broadcast the storage fault the first time a store opened on disk
    /// is seen running memory-only.
    pub(crate) fn report_storage_fault(&self) {
        let store = &self.inner.store;
        if store.mode() == StorageMode::MemoryOnly
            && store.path().is_some()
            && !self.inner.storage_fault_reported.swap(true, Ordering::AcqRel)
        {
            self.fault(EngineFault::StorageUnavailable);
        }
    }

    /// Recompute status from the store and publish it.
    pub async fn refresh_status(&self) -> SyncResult<SyncStatus> {
        let max_retries = self.inner.settings.max_retries;
        let (counts, conflict_count) = self
            .inner
            .store
            .transaction(move |tx| {
                let counts = queue_ops::counts(tx, max_retries)?;
                let conflicts = conflict_coordinator::ops::list(tx)?.len();
                Ok((counts, conflicts))
            })
            .await?;

        let status = SyncStatus {
            is_syncing: self.is_syncing(),
            pending_count: counts.pending,
            failed_count: counts.failed,
            conflict_count,
            last_sync_time: *self.inner.last_sync_time.lock(),
            storage_mode: self.inner.store.mode(),
        };
        self.inner.status_tx.send_replace(status.clone());
        self.emit(SyncEvent::Status(status.clone()));
        Ok(status)
    }

    pub(crate) async fn publish_status(&self) {
        let result = self.refresh_status().await;
        self.report_storage_fault();
        if let Err(e) = result {
            self.fault(EngineFault::Storage(e.to_string()));
        }
    }
}
