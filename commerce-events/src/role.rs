//! Shared plumbing for the publisher and subscriber process roles.

use crate::bus::TransportError;
use crate::config::ConfigError;
use crate::simulator::SimulationError;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Errors that end a role.
#[derive(Debug, Error)]
pub enum RoleError {
    /// The session could not be established
    #[error("Connection failed: {0}")]
    Connection(#[source] TransportError),

    /// The session failed in a way the role cannot continue from
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The simulator hit an invariant violation
    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),
    /// Role settings were rejected at construction
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for role operations.
pub type RoleResult<T> = Result<T, RoleError>;

/// Periodic timer whose first tick is one full period away.
pub(crate) fn periodic(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Wait for the next tick of an optional timer; pends forever when unset.
pub(crate) async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Wait until shutdown is requested or the sender is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_first_tick_after_one_period() {
        let start = Instant::now();
        let mut interval = periodic(Duration::from_secs(5));
        interval.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unset_timer_never_ticks() {
        let mut timer = None;
        let result = time::timeout(Duration::from_secs(60), next_tick(&mut timer)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_requested() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        shutdown_requested(&mut rx).await;

        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        shutdown_requested(&mut rx).await;
    }
}
