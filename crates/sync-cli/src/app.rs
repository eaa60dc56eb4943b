//! Command implementations. Every command prints one JSON document on stdout.

use std::sync::Arc;

use conflict_coordinator::{BulkResolution, Resolution};
use connectivity_monitor::ConnectivityMonitor;
use remote_api_client::{HealthProbe, HttpApiClient, HttpClientConfig, ProbeConfig};
use serde::Serialize;
use serde_json::{json, Value};
use sync_config_and_utils::{Config, Paths};
use sync_manager::{open_store, DrainOutcome, SyncManager};
use tracing::{info, warn};

use crate::Side;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// A sync manager wired to the on-disk queue and the configured API.
pub struct Engine {
    manager: SyncManager,
    monitor: ConnectivityMonitor,
    probe: HealthProbe,
}

impl Engine {
    pub async fn open(config: &Config, paths: &Paths) -> CliResult<Self> {
        let store = open_store(&paths.database_file()).await?;

        let api = HttpApiClient::new(HttpClientConfig {
            base_url: config.api_base_url()?.to_string(),
            timeout_secs: config.request_timeout_secs,
            ..Default::default()
        })?;
        let probe = HealthProbe::new(ProbeConfig {
            health_url: config.health_url()?.to_string(),
            interval_secs: config.probe_interval_secs,
            timeout_secs: config.request_timeout_secs,
        })?;

        // Offline until a probe says otherwise.
        let monitor = ConnectivityMonitor::new(false);
        let manager = SyncManager::new(
            store,
            Arc::new(api),
            Arc::new(monitor.clone()),
            config.sync_settings(),
        )
        .await?;

        Ok(Self {
            manager,
            monitor,
            probe,
        })
    }

    pub async fn status(&self) -> CliResult<()> {
        let status = self.manager.refresh_status().await?;
        print_json(&status)
    }

    pub async fn pending(&self) -> CliResult<()> {
        print_json(&self.manager.get_pending_items().await?)
    }

    pub async fn failed(&self) -> CliResult<()> {
        print_json(&self.manager.get_failed_items().await?)
    }

    pub async fn retry_failed(&self) -> CliResult<()> {
        self.go_online().await;
        let outcome = self.manager.retry_failed().await?;
        print_json(&outcome_json(&outcome))
    }

    pub async fn discard(&self, id: i64) -> CliResult<()> {
        self.manager.discard(id).await?;
        info!(id, "Discarded queued mutation");
        print_json(&json!({ "discarded": id }))
    }

    pub async fn purge_synced(&self) -> CliResult<()> {
        let purged = self.manager.purge_synced().await?;
        print_json(&json!({ "purged": purged }))
    }

    pub async fn conflicts(&self) -> CliResult<()> {
        print_json(&self.manager.conflicts().await?)
    }

    pub async fn resolve(&self, id: &str, side: Side) -> CliResult<()> {
        let resolution = match side {
            Side::Local => Resolution::Local,
            Side::Server => Resolution::Server,
        };
        self.manager.resolve_conflict(id, resolution).await?;
        print_json(&json!({ "resolved": id }))
    }

    pub async fn resolve_all(&self, side: Side) -> CliResult<()> {
        let resolution = match side {
            Side::Local => BulkResolution::Local,
            Side::Server => BulkResolution::Server,
        };
        let resolved = self.manager.resolve_all_conflicts(resolution).await?;
        print_json(&json!({ "resolved": resolved }))
    }

    pub async fn sync(&self) -> CliResult<()> {
        self.go_online().await;
        let outcome = self.manager.sync().await;
        print_json(&outcome_json(&outcome))
    }

    /// Drain on every online transition, enqueue and retry timer until
    /// interrupted, then print the final status.
    pub async fn run(&self) -> CliResult<()> {
        let probe = self.probe.clone().spawn(self.monitor.clone());
        self.manager.start();
        info!("Sync engine running, press Ctrl-C to stop");

        let stopped = tokio::signal::ctrl_c().await;
        self.manager.shutdown();
        probe.abort();
        stopped?;

        info!("Sync engine stopped");
        print_json(&self.manager.refresh_status().await?)
    }

    async fn go_online(&self) {
        if !self.probe.check(&self.monitor).await {
            warn!("Server unreachable, staying offline");
        }
    }
}

fn outcome_json(outcome: &DrainOutcome) -> Value {
    match outcome {
        DrainOutcome::AlreadyRunning => json!({ "outcome": "already_running" }),
        DrainOutcome::Offline => json!({ "outcome": "offline" }),
        DrainOutcome::Completed(report) => json!({ "outcome": "completed", "report": report }),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_manager::DrainReport;

    #[test]
    fn test_outcome_json_shapes() {
        assert_eq!(outcome_json(&DrainOutcome::Offline)["outcome"], "offline");
        assert_eq!(
            outcome_json(&DrainOutcome::AlreadyRunning)["outcome"],
            "already_running"
        );

        let report = DrainReport {
            attempted: 2,
            succeeded: 1,
            retried: 1,
            ..Default::default()
        };
        let value = outcome_json(&DrainOutcome::Completed(report));
        assert_eq!(value["outcome"], "completed");
        assert_eq!(value["report"]["attempted"], 2);
        assert_eq!(value["report"]["stopped_offline"], false);
    }
}
