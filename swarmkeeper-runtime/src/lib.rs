//! # Swarmkeeper Runtime
//!
//! Async scheduling primitives for reconciliation cycles.
//!
//! This crate provides:
//! - A [`Runtime`] trait over clocks and sleeps, with Tokio and mock implementations
//! - [`fan_out`] for running one future per item concurrently and joining them
//! - [`bounded`] for giving a single operation an upper time limit
//! - [`periodically`] for a non-overlapping cycle loop with graceful shutdown

#![forbid(unsafe_code)]

use std::fmt::Display;
use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use futures::future::{join_all, select, Either};
use tracing::{debug, error, info};

/// Runtime trait for clocks and timers
pub trait Runtime: Send + Sync + 'static {
    /// Milliseconds on this runtime's clock
    fn now(&self) -> u64;

    /// Sleep for the specified duration
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

pub mod tokio_runtime {
    //! Tokio-based runtime implementation

    use super::*;

    /// Tokio runtime wrapper
    #[derive(Debug, Clone, Default)]
    pub struct TokioRuntime;

    impl TokioRuntime {
        /// Create a new Tokio runtime wrapper
        pub fn new() -> Self {
            Self
        }
    }

    impl Runtime for TokioRuntime {
        fn now(&self) -> u64 {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64
        }

        async fn sleep(&self, duration: Duration) {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Mock runtime for testing
pub mod mock_runtime {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Runtime whose sleeps return immediately and advance a virtual clock
    #[derive(Debug, Default)]
    pub struct MockRuntime {
        current_time_ms: AtomicU64,
    }

    impl MockRuntime {
        /// Create a new mock runtime
        pub fn new() -> Self {
            Self::default()
        }

        /// Advance the mock clock
        pub fn advance(&self, duration: Duration) {
            self.current_time_ms
                .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
        }
    }

    impl Runtime for MockRuntime {
        fn now(&self) -> u64 {
            self.current_time_ms.load(Ordering::SeqCst)
        }

        async fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }
    }
}

pub use mock_runtime::MockRuntime;
pub use tokio_runtime::TokioRuntime;

/// Get the default runtime
pub fn default_runtime() -> TokioRuntime {
    TokioRuntime::new()
}

/// An operation ran past its time limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {0:?} elapsed")]
pub struct Elapsed(pub Duration);

/// Run `fut`, giving up after `limit`
pub async fn bounded<F: Future>(limit: Duration, fut: F) -> Result<F::Output, Elapsed> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Elapsed(limit))
}

/// Start one future per item and wait for all of them.
///
/// Outputs come back in input order. Nothing is cancelled when an individual
/// future fails; callers merge the results afterwards.
pub async fn fan_out<I, F, Fut>(items: I, f: F) -> Vec<Fut::Output>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future,
{
    join_all(items.into_iter().map(f)).await
}

/// Run `cycle` back to back, `period` apart, until `shutdown` resolves.
///
/// Cycles never overlap: the wait starts when a cycle finishes. A failed
/// cycle is logged and the loop carries on. Shutdown is only honoured
/// between cycles, so an in-flight cycle always completes. Returns the
/// number of cycles run.
pub async fn periodically<R, S, C, Fut, T, E>(
    runtime: &R,
    period: Duration,
    shutdown: S,
    mut cycle: C,
) -> u64
where
    R: Runtime,
    S: Future<Output = ()>,
    C: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut shutdown = pin!(shutdown);
    let mut cycles = 0;

    loop {
        cycles += 1;
        let started = runtime.now();
        match cycle().await {
            Ok(_) => debug!(
                cycle = cycles,
                elapsed_ms = runtime.now().saturating_sub(started),
                "cycle complete"
            ),
            Err(e) => error!(cycle = cycles, error = %e, "cycle failed"),
        }

        let wait = pin!(runtime.sleep(period));
        if let Either::Left(_) = select(shutdown.as_mut(), wait).await {
            info!(cycles, "shutdown requested, stopping");
            return cycles;
        }
    }
}
