//! `distributor` — claims batches queued for its cluster, submits them
//! through a `ClusterDriver`, and polls the backend for outcomes. One
//! process per (cluster, workflow run) pairing, matching the server's
//! `distributor_instance` row it registers at startup.

pub mod error;
pub mod gateway;
pub mod launcher;
pub mod poller;

pub use error::DistributorError;
pub use gateway::Gateway;
pub use launcher::Launcher;
pub use poller::Poller;

use std::sync::Arc;
use std::time::Duration;

use nodes::ClusterDriver;

/// Resolve a cluster name to its `ClusterDriver`, the same lookup the
/// worker-mode CLI subcommand performs for `WorkerClient`.
pub fn driver_for_cluster(name: &str) -> Box<dyn ClusterDriver> {
    match name {
        "dummy" => Box::new(nodes::DummyDriver::default()),
        _ => Box::new(nodes::SequentialDriver::default()),
    }
}

pub struct DistributorLoop {
    gateway: Gateway,
    driver: Arc<dyn ClusterDriver>,
    distributor_instance_id: i64,
    workflow_run_id: i64,
    report_by_increment: f64,
    launch_concurrency: usize,
}

impl DistributorLoop {
    pub async fn start(
        gateway: Gateway,
        driver: Box<dyn ClusterDriver>,
        cluster_id: i64,
        workflow_run_id: i64,
        report_by_increment: f64,
        launch_concurrency: usize,
    ) -> Result<Self, DistributorError> {
        let instance = gateway
            .register(cluster_id, Some(workflow_run_id), report_by_increment)
            .await?;
        Ok(Self {
            gateway,
            driver: Arc::from(driver),
            distributor_instance_id: instance.id,
            workflow_run_id,
            report_by_increment,
            launch_concurrency,
        })
    }

    /// One iteration: launch newly queued batches, poll what's running,
    /// triage anything the server flagged, then renew this instance's
    /// liveness lease. Returns how many instances reached a terminal
    /// classification, so the caller can decide whether to keep polling.
    pub async fn tick(&self) -> Result<usize, DistributorError> {
        let launcher = Launcher::new(self.gateway.clone(), self.driver.clone(), self.distributor_instance_id);
        let launched = launcher
            .launch_ready_batches(self.workflow_run_id, self.launch_concurrency)
            .await?;
        if launched > 0 {
            tracing::info!(launched, "submitted new batches");
        }

        let poller = Poller::new(&self.gateway, self.driver.as_ref(), self.distributor_instance_id);
        let settled = poller.poll_active().await? + poller.triage().await?;

        self.gateway
            .heartbeat(self.distributor_instance_id, self.report_by_increment)
            .await?;

        Ok(settled)
    }

    /// Run `tick` forever on `poll_interval`, until the caller drops this
    /// future (e.g. on a shutdown signal).
    pub async fn run_forever(&self, poll_interval: Duration) -> Result<(), DistributorError> {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                tracing::warn!(error = %e, "distributor tick failed, retrying next interval");
            }
        }
    }
}
