//! Debounced publisher
//!
//! Uploads every changed file as it arrives and advances the generation
//! marker once the stream of changes has been quiet for the configured
//! period. A single event loop owns the debounce state, so a marker write can
//! never overlap another marker write or race with a new submission.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use object_store::path::Path;
use object_store::{ObjectStore, PutPayload, WriteMultipart};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::keyspace::{KeyError, Keyspace};
use crate::marker::GenerationMarker;
use crate::shutdown::Shutdown;

/// Default quiet period before the marker advances.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(2);

/// Files up to this size go up in a single put; larger ones are streamed in
/// parts of this size.
pub const DEFAULT_PART_SIZE: usize = 8 * 1024 * 1024;

/// Parts uploaded concurrently for one file.
const MAX_CONCURRENT_PARTS: usize = 4;

/// A changed local file.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub detected_at: Instant,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            detected_at: Instant::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to upload {key}: {source}")]
    Upload {
        key: Path,
        #[source]
        source: object_store::Error,
    },
    #[error("failed to write generation marker {key}: {source}")]
    Marker {
        key: Path,
        #[source]
        source: object_store::Error,
    },
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Watched root; keys are derived relative to it.
    pub root: PathBuf,
    pub keyspace: Keyspace,
    pub quiet_period: Duration,
}

/// Counters returned when the publisher stops.
#[derive(Debug, Clone, Default)]
pub struct PublishStats {
    pub uploads: u64,
    /// Uploads that went through a multipart upload.
    pub multipart_uploads: u64,
    pub bytes: u64,
    pub advances: u64,
    pub last_marker: Option<GenerationMarker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Debounce {
    Idle,
    Pending { deadline: Instant },
}

pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    config: PublisherConfig,
    part_size: usize,
    state: Debounce,
    stats: PublishStats,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>, config: PublisherConfig) -> Self {
        Self {
            store,
            config,
            part_size: DEFAULT_PART_SIZE,
            state: Debounce::Idle,
            stats: PublishStats::default(),
        }
    }

    /// Override the multipart threshold and part size.
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    pub fn stats(&self) -> &PublishStats {
        &self.stats
    }

    /// Whether a marker advance is armed.
    pub fn is_pending(&self) -> bool {
        matches!(self.state, Debounce::Pending { .. })
    }

    /// Upload `event.path` and re-arm the quiet-period timer.
    ///
    /// The deadline is taken after the upload completes, so the marker
    /// written at the deadline always follows every upload before it.
    pub async fn submit(&mut self, event: ChangeEvent) -> Result<(), PublishError> {
        let key = self
            .config
            .keyspace
            .remote_key(&self.config.root, &event.path)?;

        let read_error = |source| PublishError::Read {
            path: event.path.clone(),
            source,
        };
        let mut file = File::open(&event.path).await.map_err(read_error)?;
        let len = file.metadata().await.map_err(read_error)?.len();

        let size = if len <= self.part_size as u64 {
            let mut data = Vec::with_capacity(len as usize);
            file.read_to_end(&mut data).await.map_err(read_error)?;
            let size = data.len() as u64;
            self.store
                .put(&key, PutPayload::from(data))
                .await
                .map_err(|source| PublishError::Upload {
                    key: key.clone(),
                    source,
                })?;
            size
        } else {
            let size = self.upload_parts(&key, &event.path, file).await?;
            self.stats.multipart_uploads += 1;
            size
        };

        self.stats.uploads += 1;
        self.stats.bytes += size;
        info!(
            key = %key,
            size,
            latency_ms = event.detected_at.elapsed().as_millis() as u64,
            "uploaded file"
        );

        self.state = Debounce::Pending {
            deadline: Instant::now() + self.config.quiet_period,
        };
        Ok(())
    }

    /// Stream `file` to `key` in `part_size` chunks.
    async fn upload_parts(
        &self,
        key: &Path,
        path: &FsPath,
        mut file: File,
    ) -> Result<u64, PublishError> {
        let upload_error = |source| PublishError::Upload {
            key: key.clone(),
            source,
        };
        let upload = self.store.put_multipart(key).await.map_err(upload_error)?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, self.part_size);

        let streamed = copy_parts(&mut file, path, key, &mut writer, self.part_size).await;
        match streamed {
            Ok(size) => {
                writer.finish().await.map_err(upload_error)?;
                debug!(key = %key, size, "completed multipart upload");
                Ok(size)
            }
            Err(err) => {
                if let Err(abort) = writer.abort().await {
                    warn!(key = %key, error = %abort, "failed to abort multipart upload");
                }
                Err(err)
            }
        }
    }

    /// Write a fresh generation marker and return to idle.
    async fn advance(&mut self) -> Result<(), PublishError> {
        let key = self.config.keyspace.marker_key();
        let marker = GenerationMarker::now();

        self.store
            .put(&key, PutPayload::from(marker.clone().into_bytes()))
            .await
            .map_err(|source| PublishError::Marker {
                key: key.clone(),
                source,
            })?;

        info!(key = %key, generation = %marker, "advanced generation marker");
        self.state = Debounce::Idle;
        self.stats.advances += 1;
        self.stats.last_marker = Some(marker);
        Ok(())
    }

    /// Drive the publisher until shutdown or until `changes` closes.
    ///
    /// When `changes` closes with an advance armed, the remaining quiet
    /// period is waited out and the marker written before returning. On
    /// shutdown an armed advance is dropped.
    pub async fn run(
        mut self,
        changes: flume::Receiver<ChangeEvent>,
        shutdown: Shutdown,
    ) -> Result<PublishStats, PublishError> {
        let mut open = true;

        loop {
            let deadline = match self.state {
                Debounce::Idle if !open => break,
                Debounce::Idle => None,
                Debounce::Pending { deadline } => Some(deadline),
            };

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    if self.is_pending() {
                        debug!("shutdown with a pending generation advance, dropping it");
                    }
                    break;
                }
                event = changes.recv_async(), if open => match event {
                    Ok(event) => self.submit(event).await?,
                    Err(_) => {
                        debug!("change stream closed");
                        open = false;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.advance().await?;
                }
            }
        }

        Ok(self.stats)
    }
}

/// Feed `file` into `writer` until end of file. Returns the bytes read.
async fn copy_parts(
    file: &mut File,
    path: &FsPath,
    key: &Path,
    writer: &mut WriteMultipart,
    part_size: usize,
) -> Result<u64, PublishError> {
    let mut buf = vec![0u8; part_size];
    let mut size = 0u64;
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|source| PublishError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if n == 0 {
            return Ok(size);
        }
        writer
            .wait_for_capacity(MAX_CONCURRENT_PARTS)
            .await
            .map_err(|source| PublishError::Upload {
                key: key.clone(),
                source,
            })?;
        writer.write(&buf[..n]);
        size += n as u64;
    }
}
