//! Periodic reachability check feeding a [`ConnectivityMonitor`].

use crate::RemoteResult;
use connectivity_monitor::ConnectivityMonitor;
use reqwest::Client;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// URL polled with GET. Any 2xx counts as online.
    pub health_url: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            health_url: "http://127.0.0.1:3000/health".to_string(),
            interval_secs: 15,
            timeout_secs: 5,
        }
    }
}

/// Connectivity signal derived from polling a health endpoint.
#[derive(Clone)]
pub struct HealthProbe {
    url: Url,
    interval: Duration,
    client: Client,
}

impl HealthProbe {
    pub fn new(config: ProbeConfig) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            url: Url::parse(&config.health_url)?,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            client,
        })
    }

    /// One GET against the health URL.
    pub async fn probe_once(&self) -> bool {
        match self.client.get(self.url.clone()).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(url = %self.url, error = %e, "Health probe failed");
                false
            }
        }
    }

    /// Probe once and report the result.
    pub async fn check(&self, monitor: &ConnectivityMonitor) -> bool {
        let online = self.probe_once().await;
        monitor.report(online);
        online
    }

    /// Poll forever, reporting each result. Abort the handle to stop.
    pub fn spawn(self, monitor: ConnectivityMonitor) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                self.check(&monitor).await;
            }
        })
    }
}
