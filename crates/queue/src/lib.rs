//! `queue` crate — a bounded, per-tick command executor.
//!
//! The distributor's poll loop produces a batch of independent cluster
//! calls (submit one array, poll another, kill a third) every tick. This
//! crate runs that batch with a concurrency cap so one slow backend call
//! can't starve the rest of the tick, without pulling in a full actor
//! framework for what's a one-shot fan-out.

pub mod error;

pub use error::QueueError;

use std::future::Future;
use std::pin::Pin;

use tokio::task::JoinSet;

/// One unit of distributor work: submit, poll, or kill, boxed so a tick
/// can hold a heterogeneous batch of them.
pub type DistributorCommand =
    Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + 'static>>;

/// Runs up to `concurrency` commands at a time, draining `commands`
/// until empty. Returns the number that completed with an error.
pub async fn run_tick(commands: Vec<DistributorCommand>, concurrency: usize) -> usize {
    let mut pending = commands.into_iter();
    let mut in_flight: JoinSet<Result<(), QueueError>> = JoinSet::new();
    let mut errors = 0;

    for cmd in pending.by_ref().take(concurrency) {
        in_flight.spawn(cmd);
    }

    while let Some(result) = in_flight.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(_)) | Err(_) => errors += 1,
        }

        if let Some(cmd) = pending.next() {
            in_flight.spawn(cmd);
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_all_commands_within_concurrency_cap() {
        let commands: Vec<DistributorCommand> = (0..10)
            .map(|_| -> DistributorCommand { Box::pin(async { Ok(()) }) })
            .collect();

        let errors = run_tick(commands, 3).await;
        assert_eq!(errors, 0);
    }

    #[tokio::test]
    async fn counts_failed_commands() {
        let commands: Vec<DistributorCommand> = vec![
            Box::pin(async { Ok(()) }),
            Box::pin(async { Err(QueueError::Closed) }),
        ];

        let errors = run_tick(commands, 2).await;
        assert_eq!(errors, 1);
    }
}
