//! Shutdown coordination
//!
//! Every worker in a pipeline shares one [`Shutdown`] latch. The first call to
//! [`Shutdown::terminate`] or [`Shutdown::fail`] wins: it fixes the process
//! outcome and cancels the token that every worker selects on at its wait
//! points. Later calls only cancel (already cancelled) and are otherwise
//! ignored.
//!
//! [`Supervisor`] owns the worker tasks. It forwards a worker's error into the
//! latch, waits for the latch, and then joins the remaining workers so that
//! their timers, tickers and watch handles are dropped before the outcome is
//! handed back to `main`.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SyncError;

/// Terminal outcome of a pipeline.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Stopped by a termination signal (or every worker finished).
    Terminated,
    /// Stopped by the first fatal worker error.
    Failed(Arc<SyncError>),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Terminated)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Terminated => write!(f, "terminated"),
            Outcome::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Set-once shutdown latch plus the cancellation signal derived from it.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    outcome: Arc<OnceLock<Outcome>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a graceful stop. Returns true if this call set the outcome.
    pub fn terminate(&self) -> bool {
        self.latch(Outcome::Terminated)
    }

    /// Report a fatal error. Returns true if this call set the outcome.
    pub fn fail(&self, err: impl Into<SyncError>) -> bool {
        self.latch(Outcome::Failed(Arc::new(err.into())))
    }

    fn latch(&self, outcome: Outcome) -> bool {
        // the outcome is stored before the token fires so waiters always see it
        let won = match self.outcome.set(outcome) {
            Ok(()) => true,
            Err(ignored) => {
                debug!(outcome = %ignored, "shutdown already latched, ignoring");
                false
            }
        };
        self.token.cancel();
        won
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome.get().cloned()
    }

    /// Resolves once the latch is set.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Wait for the latch and return the outcome it holds.
    pub async fn wait(&self) -> Outcome {
        self.token.cancelled().await;
        self.outcome().unwrap_or(Outcome::Terminated)
    }
}

/// Owns the worker tasks of one pipeline.
pub struct Supervisor {
    shutdown: Shutdown,
    workers: JoinSet<()>,
}

impl Supervisor {
    pub fn new(shutdown: Shutdown) -> Self {
        Self {
            shutdown,
            workers: JoinSet::new(),
        }
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Spawn a worker. Its error, if any, is forwarded to the latch; a clean
    /// finish only logs the summary it returns.
    pub fn spawn<F, T, E>(&mut self, name: &'static str, worker: F)
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: fmt::Debug + Send + 'static,
        E: Into<SyncError> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        debug!(worker = name, "spawning worker");
        self.workers.spawn(async move {
            match worker.await {
                Ok(summary) => info!(worker = name, ?summary, "worker finished"),
                Err(err) => {
                    let err = err.into();
                    error!(worker = name, error = %err, "worker failed");
                    shutdown.fail(err);
                }
            }
        });
    }

    /// Block until the latch is set, then join every worker.
    ///
    /// If all workers finish without setting the latch, the pipeline counts
    /// as terminated.
    pub async fn wait(mut self) -> Outcome {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                joined = self.workers.join_next() => match joined {
                    None => {
                        debug!("all workers finished");
                        self.shutdown.terminate();
                    }
                    Some(Ok(())) => {}
                    Some(Err(err)) => {
                        self.shutdown.fail(err);
                    }
                },
            }
        }

        while let Some(joined) = self.workers.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "worker task ended abnormally during shutdown");
            }
        }

        self.shutdown.outcome().unwrap_or(Outcome::Terminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::time::Duration;

    use crate::poller::PollError;

    fn missing_marker() -> PollError {
        PollError::MarkerMissing {
            key: object_store::path::Path::from("p/__lock__timer__"),
        }
    }

    #[tokio::test]
    async fn test_first_outcome_wins() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());

        assert!(shutdown.fail(missing_marker()));
        assert!(!shutdown.terminate());
        assert!(!shutdown.fail(missing_marker()));

        assert!(shutdown.is_triggered());
        let outcome = shutdown.wait().await;
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_clones_share_the_latch() {
        let shutdown = Shutdown::new();
        let other = shutdown.clone();

        let waiter = tokio::spawn(async move { other.wait().await });
        shutdown.terminate();

        let outcome = waiter.await.unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_supervisor_forwards_worker_error() {
        let mut supervisor = Supervisor::new(Shutdown::new());
        let shutdown = supervisor.shutdown().clone();

        // a well-behaved worker that stops when told to
        supervisor.spawn("idle", async move {
            shutdown.cancelled().await;
            Ok::<_, Infallible>("stopped")
        });
        supervisor.spawn("failing", async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err::<(), _>(missing_marker())
        });

        let outcome = tokio::time::timeout(Duration::from_secs(5), supervisor.wait())
            .await
            .expect("supervisor should stop after the failure");

        match outcome {
            Outcome::Failed(err) => assert!(matches!(
                err.as_ref(),
                SyncError::Poll(PollError::MarkerMissing { .. })
            )),
            Outcome::Terminated => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_supervisor_terminates_when_all_workers_finish() {
        let mut supervisor = Supervisor::new(Shutdown::new());
        supervisor.spawn("quick", async { Ok::<_, Infallible>(1u32) });

        let outcome = tokio::time::timeout(Duration::from_secs(5), supervisor.wait())
            .await
            .unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_supervisor_reports_panicked_worker() {
        let mut supervisor = Supervisor::new(Shutdown::new());
        supervisor.spawn("panics", async {
            if true {
                panic!("boom");
            }
            Ok::<(), Infallible>(())
        });

        let outcome = tokio::time::timeout(Duration::from_secs(5), supervisor.wait())
            .await
            .unwrap();
        match outcome {
            Outcome::Failed(err) => assert!(matches!(err.as_ref(), SyncError::Join(_))),
            Outcome::Terminated => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_external_terminate_stops_supervisor() {
        let mut supervisor = Supervisor::new(Shutdown::new());
        let shutdown = supervisor.shutdown().clone();
        let worker_shutdown = shutdown.clone();

        supervisor.spawn("ticker", async move {
            let mut ticks = 0u32;
            let mut interval = tokio::time::interval(Duration::from_millis(5));
            loop {
                tokio::select! {
                    _ = worker_shutdown.cancelled() => break,
                    _ = interval.tick() => ticks += 1,
                }
            }
            Ok::<_, Infallible>(ticks)
        });

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            shutdown.terminate();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(5), supervisor.wait())
            .await
            .unwrap();
        assert!(outcome.is_success());
    }
}
