//! Remote poller
//!
//! Reads the generation marker on a fixed interval and emits a trigger each
//! time its bytes differ from the last value seen.

use std::sync::Arc;
use std::time::Duration;

use object_store::path::Path;
use object_store::ObjectStore;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::keyspace::Keyspace;
use crate::marker::GenerationMarker;
use crate::shutdown::Shutdown;

/// Default interval between marker reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What to do when the marker object does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingMarker {
    /// Treat it as a failed read.
    #[default]
    Fail,
    /// Treat it as "no generation yet" and keep polling.
    Wait,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("generation marker {key} does not exist")]
    MarkerMissing { key: Path },
    #[error("failed to read generation marker {key}: {source}")]
    Read {
        key: Path,
        #[source]
        source: object_store::Error,
    },
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub keyspace: Keyspace,
    pub interval: Duration,
    pub missing_marker: MissingMarker,
}

#[derive(Debug, Clone, Default)]
pub struct PollStats {
    pub polls: u64,
    pub changes: u64,
    pub last_marker: Option<GenerationMarker>,
}

/// Single-slot channel carrying generations from the poller to the fetcher.
///
/// One generation can wait while a fetch cycle runs; a further change makes
/// the poller wait for the slot to drain.
pub fn trigger_channel() -> (
    flume::Sender<GenerationMarker>,
    flume::Receiver<GenerationMarker>,
) {
    flume::bounded(1)
}

pub struct Poller {
    store: Arc<dyn ObjectStore>,
    config: PollerConfig,
    last: Option<GenerationMarker>,
    stats: PollStats,
}

impl Poller {
    pub fn new(store: Arc<dyn ObjectStore>, config: PollerConfig) -> Self {
        Self {
            store,
            config,
            last: None,
            stats: PollStats::default(),
        }
    }

    pub fn last_observed(&self) -> Option<&GenerationMarker> {
        self.last.as_ref()
    }

    /// Read the marker once. Returns the new value if it changed.
    pub async fn poll_once(&mut self) -> Result<Option<GenerationMarker>, PollError> {
        let key = self.config.keyspace.marker_key();
        self.stats.polls += 1;

        let bytes = match self.store.get(&key).await {
            Ok(result) => result
                .bytes()
                .await
                .map_err(|source| PollError::Read {
                    key: key.clone(),
                    source,
                })?,
            Err(object_store::Error::NotFound { .. }) => match self.config.missing_marker {
                MissingMarker::Fail => return Err(PollError::MarkerMissing { key }),
                MissingMarker::Wait => {
                    debug!(key = %key, "generation marker not created yet");
                    return Ok(None);
                }
            },
            Err(source) => return Err(PollError::Read { key, source }),
        };

        let current = GenerationMarker::from_bytes(bytes);
        if self.last.as_ref() == Some(&current) {
            return Ok(None);
        }

        self.last = Some(current.clone());
        self.stats.changes += 1;
        self.stats.last_marker = Some(current.clone());
        Ok(Some(current))
    }

    /// Poll until shutdown, sending every new generation to `triggers`.
    ///
    /// The first read happens one interval after start. Returns when the
    /// trigger receiver is dropped.
    pub async fn run(
        mut self,
        triggers: flume::Sender<GenerationMarker>,
        shutdown: Shutdown,
    ) -> Result<PollStats, PollError> {
        let period = self.config.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            key = %self.config.keyspace.marker_key(),
            interval_ms = period.as_millis() as u64,
            "polling generation marker"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(generation) = self.poll_once().await? else {
                continue;
            };
            info!(generation = %generation, "detected new generation");

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                sent = triggers.send_async(generation) => {
                    if sent.is_err() {
                        debug!("trigger receiver dropped, stopping poller");
                        break;
                    }
                }
            }
        }

        Ok(self.stats)
    }
}
