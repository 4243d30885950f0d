//! A pluggable sink for reap events, the same capability-trait shape
//! `nodes::traits` uses for `ClusterDriver`/`WorkerClient`: a trait with
//! no base type to inherit from, chosen by the caller at startup.

use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn workflow_run_reaped(&self, workflow_run_id: i64, new_status: &str);
}

/// Discards every event. The default when no external notification
/// channel is configured.
#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn workflow_run_reaped(&self, _workflow_run_id: i64, _new_status: &str) {}
}

/// Logs every event at `warn` — a lost workflow run reaping is always
/// worth a human noticing.
#[derive(Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn workflow_run_reaped(&self, workflow_run_id: i64, new_status: &str) {
        tracing::warn!(workflow_run_id, new_status, "workflow run reaped");
    }
}
