//! Sweeper - periodic reclamation
//!
//! Runs `sweep` on a fixed interval so timed-out tasks return to pending and
//! delayed tasks become visible. Store errors are logged and retried on the
//! next tick; any other error stops the loop.

use crate::client::Queue;
use crate::codec::Codec;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Something that can be swept
#[async_trait]
pub trait Sweep: Send + Sync + 'static {
    /// Run one sweep pass, returning the number of reclaimed tasks
    async fn sweep(&self) -> Result<u64>;

    /// Name used in logs
    fn name(&self) -> &str;
}

#[async_trait]
impl<C: Codec> Sweep for Queue<C> {
    async fn sweep(&self) -> Result<u64> {
        Queue::sweep(self).await
    }

    fn name(&self) -> &str {
        Queue::name(self)
    }
}

/// Configuration for the sweeper
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Interval between sweep passes
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

impl SweeperConfig {
    /// Create a new sweeper configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sweep interval
    #[must_use]
    pub fn interval(mut self, duration: Duration) -> Self {
        self.interval = duration;
        self
    }
}

/// Sweeper - drives `sweep` on a timer
pub struct Sweeper<S: Sweep> {
    target: Arc<S>,
    config: SweeperConfig,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Sweep> Sweeper<S> {
    /// Create a new sweeper, not started yet
    pub fn new(target: Arc<S>, config: SweeperConfig) -> Result<Self> {
        if config.interval.is_zero() {
            return Err(Error::InvalidArgument("sweep interval must be greater than 0".into()));
        }
        Ok(Self {
            target,
            config,
            handle: Mutex::new(None),
        })
    }

    /// Start the sweep loop
    ///
    /// A running loop is kept; a loop that stopped on a fatal error is
    /// replaced.
    pub fn start(&self) {
        let mut handle = self.lock();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::debug!("Sweeper for queue {} already running", self.target.name());
            return;
        }
        *handle = Some(tokio::spawn(run_loop(self.target.clone(), self.config.interval)));
    }

    /// Stop the sweep loop
    pub fn stop(&self) {
        if let Some(handle) = self.lock().take() {
            handle.abort();
            tracing::info!("Sweeper for queue {} stopped", self.target.name());
        }
    }

    /// Whether the loop is alive
    pub fn is_running(&self) -> bool {
        self.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S: Sweep> Drop for Sweeper<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.lock().take() {
            handle.abort();
        }
    }
}

async fn run_loop<S: Sweep>(target: Arc<S>, period: Duration) {
    let mut timer = interval(period);
    timer.tick().await; // Skip first immediate tick

    tracing::info!("Sweeper started for queue {} (interval: {:?})", target.name(), period);

    loop {
        timer.tick().await;

        match target.sweep().await {
            Ok(0) => {
                tracing::debug!("Sweep of queue {} reclaimed no tasks", target.name());
            }
            Ok(reclaimed) => {
                tracing::info!(queue = %target.name(), reclaimed, "Reclaimed timed-out tasks");
            }
            Err(e) if e.is_store_error() => {
                tracing::warn!("Sweep of queue {} failed, retrying next tick: {}", target.name(), e);
            }
            Err(e) => {
                tracing::error!("Sweep of queue {} failed, sweeper stopped: {}", target.name(), e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Clone, Copy)]
    enum Outcome {
        Reclaim(u64),
        StoreError,
        Fatal,
    }

    struct FakeSweep {
        calls: AtomicU64,
        outcome: Outcome,
    }

    impl FakeSweep {
        fn new(outcome: Outcome) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU64::new(0),
                outcome,
            })
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Sweep for FakeSweep {
        async fn sweep(&self) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                Outcome::Reclaim(n) => Ok(n),
                Outcome::StoreError => Err(Error::Connection("connection refused".into())),
                Outcome::Fatal => Err(Error::Serialization("corrupt reply".into())),
            }
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn config(millis: u64) -> SweeperConfig {
        SweeperConfig::new().interval(Duration::from_millis(millis))
    }

    #[test]
    fn test_sweeper_config() {
        assert_eq!(SweeperConfig::default().interval, Duration::from_secs(60));
        assert_eq!(config(250).interval, Duration::from_millis(250));
        assert!(Sweeper::new(FakeSweep::new(Outcome::Reclaim(0)), config(0)).is_err());
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let fake = FakeSweep::new(Outcome::Reclaim(1));
        let sweeper = Sweeper::new(fake.clone(), config(50)).unwrap();

        sweeper.start();
        sweeper.start();
        sweeper.start();
        assert!(sweeper.is_running());

        tokio::time::sleep(Duration::from_millis(275)).await;
        let calls = fake.calls();
        assert!(calls >= 2, "expected at least 2 sweeps, got {}", calls);
        assert!(calls <= 7, "duplicate loops suspected: {} sweeps", calls);
    }

    #[tokio::test]
    async fn test_store_errors_keep_running() {
        let fake = FakeSweep::new(Outcome::StoreError);
        let sweeper = Sweeper::new(fake.clone(), config(20)).unwrap();

        sweeper.start();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(fake.calls() >= 2);
        assert!(sweeper.is_running());
    }

    #[tokio::test]
    async fn test_fatal_error_stops_and_restart_replaces() {
        let fake = FakeSweep::new(Outcome::Fatal);
        let sweeper = Sweeper::new(fake.clone(), config(20)).unwrap();

        sweeper.start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fake.calls(), 1);
        assert!(!sweeper.is_running());

        sweeper.start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test]
    async fn test_stop() {
        let fake = FakeSweep::new(Outcome::Reclaim(0));
        let sweeper = Sweeper::new(fake.clone(), config(20)).unwrap();

        sweeper.start();
        tokio::time::sleep(Duration::from_millis(70)).await;
        sweeper.stop();
        assert!(!sweeper.is_running());

        let calls = fake.calls();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fake.calls(), calls);
    }
}
