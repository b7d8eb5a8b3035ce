//! Snapshot fetcher
//!
//! Each trigger starts one fetch cycle: list everything under the prefix,
//! download every object into the base directory, then run the hook. Cycles
//! run one at a time in trigger order. Local files with no remote counterpart
//! are never removed.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use futures::TryStreamExt;
use object_store::path::Path;
use object_store::ObjectStore;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::hook::{Hook, HookError};
use crate::keyspace::{KeyError, Keyspace};
use crate::marker::GenerationMarker;
use crate::shutdown::Shutdown;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to list objects under {prefix}: {source}")]
    List {
        prefix: Path,
        #[source]
        source: object_store::Error,
    },
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create {}: {source}", path.display())]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to download {key}: {source}")]
    Download {
        key: Path,
        #[source]
        source: object_store::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Hook(#[from] HookError),
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub keyspace: Keyspace,
    /// Local mirror root.
    pub base: PathBuf,
    pub hook: Option<Hook>,
}

/// Result of a single fetch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub objects: u64,
    pub bytes: u64,
}

/// Counters returned when the fetcher stops.
#[derive(Debug, Clone, Default)]
pub struct FetchStats {
    pub cycles: u64,
    pub objects: u64,
    pub bytes: u64,
    pub last_generation: Option<GenerationMarker>,
}

pub struct Fetcher {
    store: Arc<dyn ObjectStore>,
    config: FetcherConfig,
    stats: FetchStats,
}

impl Fetcher {
    pub fn new(store: Arc<dyn ObjectStore>, config: FetcherConfig) -> Self {
        Self {
            store,
            config,
            stats: FetchStats::default(),
        }
    }

    pub fn stats(&self) -> &FetchStats {
        &self.stats
    }

    /// List the whole prefix and download every object, in listing order.
    ///
    /// The listing is drained until the store reports it complete; the S3
    /// backend follows continuation tokens for as many pages as it takes.
    pub async fn fetch_snapshot(&self) -> Result<CycleReport, FetchError> {
        let prefix = self.config.keyspace.prefix();
        let mut listing = self.store.list(Some(prefix));
        let mut report = CycleReport::default();

        while let Some(meta) = listing
            .try_next()
            .await
            .map_err(|source| FetchError::List {
                prefix: prefix.clone(),
                source,
            })?
        {
            let keyspace = &self.config.keyspace;
            let local = match keyspace.local_path(&self.config.base, &meta.location) {
                Ok(local) => local,
                Err(KeyError::NoRelativePath(key)) => {
                    warn!(key = %key, "skipping object stored at the prefix itself");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let written = self.download(&meta.location, &local).await?;
            debug!(
                key = %meta.location,
                path = %local.display(),
                size = written,
                "downloaded object"
            );
            report.objects += 1;
            report.bytes += written;
        }

        Ok(report)
    }

    async fn download(&self, key: &Path, local: &FsPath) -> Result<u64, FetchError> {
        if let Some(parent) = local.parent() {
            create_dir_all(parent)
                .await
                .map_err(|source| FetchError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let object = self
            .store
            .get(key)
            .await
            .map_err(|source| FetchError::Download {
                key: key.clone(),
                source,
            })?;

        let mut file = tokio::fs::File::create(local)
            .await
            .map_err(|source| FetchError::CreateFile {
                path: local.to_path_buf(),
                source,
            })?;

        let write_err = |source: std::io::Error| FetchError::Write {
            path: local.to_path_buf(),
            source,
        };

        let mut body = object.into_stream();
        let mut written = 0u64;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|source| FetchError::Download {
                key: key.clone(),
                source,
            })?
        {
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_err)?;

        Ok(written)
    }

    /// One full cycle for `generation`: snapshot, then the hook if configured.
    pub async fn run_cycle(
        &mut self,
        generation: &GenerationMarker,
    ) -> Result<CycleReport, FetchError> {
        let started = Instant::now();
        info!(generation = %generation, "fetching snapshot");

        let report = self.fetch_snapshot().await?;
        info!(
            generation = %generation,
            objects = report.objects,
            bytes = report.bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "snapshot fetched"
        );

        if let Some(hook) = &self.config.hook {
            hook.run(generation, &self.config.base).await?;
        }

        self.stats.cycles += 1;
        self.stats.objects += report.objects;
        self.stats.bytes += report.bytes;
        self.stats.last_generation = Some(generation.clone());
        Ok(report)
    }

    /// Consume triggers until shutdown or until the sender is dropped.
    pub async fn run(
        mut self,
        triggers: flume::Receiver<GenerationMarker>,
        shutdown: Shutdown,
    ) -> Result<FetchStats, FetchError> {
        loop {
            let generation = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                trigger = triggers.recv_async() => match trigger {
                    Ok(generation) => generation,
                    Err(_) => {
                        debug!("trigger stream closed, stopping fetcher");
                        break;
                    }
                },
            };

            self.run_cycle(&generation).await?;
        }

        Ok(self.stats)
    }
}

async fn create_dir_all(path: &FsPath) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o750);
    builder.create(path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use object_store::PutPayload;

    async fn put(store: &InMemory, key: &str, body: &'static str) {
        store
            .put(&Path::from(key), PutPayload::from(body))
            .await
            .unwrap();
    }

    fn fetcher(store: Arc<InMemory>, base: &FsPath, hook: Option<Hook>) -> Fetcher {
        Fetcher::new(
            store,
            FetcherConfig {
                keyspace: Keyspace::new("pads"),
                base: base.to_path_buf(),
                hook,
            },
        )
    }

    #[tokio::test]
    async fn test_snapshot_mirrors_nested_keys() {
        let store = Arc::new(InMemory::new());
        put(&store, "pads/notes.txt", "hello").await;
        put(&store, "pads/drafts/2024/todo.md", "- ship it").await;
        put(&store, "other/ignored.txt", "nope").await;

        let base = tempfile::tempdir().unwrap();
        let report = fetcher(store, base.path(), None)
            .fetch_snapshot()
            .await
            .unwrap();

        assert_eq!(report.objects, 2);
        assert_eq!(report.bytes, 14);
        assert_eq!(
            std::fs::read_to_string(base.path().join("notes.txt")).unwrap(),
            "hello"
        );
        assert_eq!(
            std::fs::read_to_string(base.path().join("drafts/2024/todo.md")).unwrap(),
            "- ship it"
        );
        assert!(!base.path().join("ignored.txt").exists());
    }

    #[tokio::test]
    async fn test_existing_files_are_overwritten() {
        let store = Arc::new(InMemory::new());
        put(&store, "pads/notes.txt", "new").await;

        let base = tempfile::tempdir().unwrap();
        std::fs::write(base.path().join("notes.txt"), "much older content").unwrap();

        fetcher(store, base.path(), None)
            .fetch_snapshot()
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(base.path().join("notes.txt")).unwrap(),
            "new"
        );
    }

    #[tokio::test]
    async fn test_local_extras_are_left_alone() {
        let store = Arc::new(InMemory::new());
        put(&store, "pads/a.txt", "a").await;

        let base = tempfile::tempdir().unwrap();
        std::fs::write(base.path().join("local-only.txt"), "keep me").unwrap();

        fetcher(store, base.path(), None)
            .fetch_snapshot()
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(base.path().join("local-only.txt")).unwrap(),
            "keep me"
        );
    }

    #[tokio::test]
    async fn test_each_cycle_lists_afresh() {
        let store = Arc::new(InMemory::new());
        put(&store, "pads/a.txt", "a").await;

        let base = tempfile::tempdir().unwrap();
        let mut fetcher = fetcher(store.clone(), base.path(), None);

        let first = fetcher
            .run_cycle(&GenerationMarker::from_bytes("gen-1"))
            .await
            .unwrap();
        assert_eq!(first.objects, 1);

        put(&store, "pads/b.txt", "b").await;
        let second = fetcher
            .run_cycle(&GenerationMarker::from_bytes("gen-2"))
            .await
            .unwrap();
        assert_eq!(second.objects, 2);
        assert!(base.path().join("b.txt").exists());

        assert_eq!(fetcher.stats().cycles, 2);
        assert_eq!(
            fetcher.stats().last_generation,
            Some(GenerationMarker::from_bytes("gen-2"))
        );
    }

    #[tokio::test]
    async fn test_refetching_is_idempotent() {
        let store = Arc::new(InMemory::new());
        put(&store, "pads/a.txt", "alpha").await;
        put(&store, "pads/dir/b.txt", "beta").await;

        let base = tempfile::tempdir().unwrap();
        let mut fetcher = fetcher(store, base.path(), None);
        let generation = GenerationMarker::from_bytes("gen-1");

        let first = fetcher.run_cycle(&generation).await.unwrap();
        let snapshot = |dir: &FsPath| {
            let mut files: Vec<(PathBuf, Vec<u8>)> = walk(dir)
                .into_iter()
                .map(|path| {
                    let body = std::fs::read(&path).unwrap();
                    (path, body)
                })
                .collect();
            files.sort();
            files
        };
        let before = snapshot(base.path());

        let second = fetcher.run_cycle(&generation).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(before, snapshot(base.path()));
    }

    fn walk(dir: &FsPath) -> Vec<PathBuf> {
        walkdir::WalkDir::new(dir)
            .into_iter()
            .map(|entry| entry.unwrap())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect()
    }

    #[tokio::test]
    async fn test_marker_is_mirrored_with_the_rest() {
        let store = Arc::new(InMemory::new());
        put(&store, "pads/__lock__timer__", "gen-1").await;
        put(&store, "pads/a.txt", "a").await;

        let base = tempfile::tempdir().unwrap();
        let report = fetcher(store, base.path(), None)
            .fetch_snapshot()
            .await
            .unwrap();
        assert_eq!(report.objects, 2);
        assert!(base.path().join("__lock__timer__").exists());
    }

    #[tokio::test]
    async fn test_unwritable_base_aborts_cycle() {
        let store = Arc::new(InMemory::new());
        put(&store, "pads/dir/a.txt", "a").await;

        let base = tempfile::tempdir().unwrap();
        // a regular file where a directory is needed
        std::fs::write(base.path().join("dir"), "in the way").unwrap();

        let err = fetcher(store, base.path(), None)
            .fetch_snapshot()
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::CreateDir { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_hook_fails_the_cycle() {
        let store = Arc::new(InMemory::new());
        put(&store, "pads/a.txt", "a").await;

        let base = tempfile::tempdir().unwrap();
        let hook = Hook::new("sh", vec!["-c".to_string(), "exit 1".to_string()]);
        let mut fetcher = fetcher(store, base.path(), Some(hook));

        let err = fetcher
            .run_cycle(&GenerationMarker::from_bytes("gen-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Hook(HookError::Failed { .. })));
        // files fetched before the hook stay on disk
        assert!(base.path().join("a.txt").exists());
        assert_eq!(fetcher.stats().cycles, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hook_runs_after_download() {
        let store = Arc::new(InMemory::new());
        put(&store, "pads/a.txt", "payload").await;

        let base = tempfile::tempdir().unwrap();
        let hook = Hook::new(
            "sh",
            vec![
                "-c".to_string(),
                "cp \"$PADSYNC_BASE/a.txt\" \"$PADSYNC_BASE/copied.txt\"".to_string(),
            ],
        );

        fetcher(store, base.path(), Some(hook))
            .run_cycle(&GenerationMarker::from_bytes("gen-1"))
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(base.path().join("copied.txt")).unwrap(),
            "payload"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_queued_trigger_waits_for_running_cycle() {
        let store = Arc::new(InMemory::new());
        put(&store, "pads/a.txt", "a").await;

        let base = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        let log = logs.path().join("hook.log");
        let hook = Hook::new(
            "sh",
            vec![
                "-c".to_string(),
                concat!(
                    "echo \"start $PADSYNC_GENERATION\" >> \"$1\"; ",
                    "sleep 0.3; ",
                    "echo \"end $PADSYNC_GENERATION\" >> \"$1\""
                )
                .to_string(),
                "hook".to_string(),
                log.display().to_string(),
            ],
        );

        let (triggers, rx) = crate::poller::trigger_channel();
        let fetcher = fetcher(store, base.path(), Some(hook));
        let handle = tokio::spawn(fetcher.run(rx, Shutdown::new()));

        triggers
            .send_async(GenerationMarker::from_bytes("gen-1"))
            .await
            .unwrap();
        triggers
            .send_async(GenerationMarker::from_bytes("gen-2"))
            .await
            .unwrap();
        drop(triggers);

        let stats = tokio::time::timeout(std::time::Duration::from_secs(10), handle)
            .await
            .expect("fetcher should drain both triggers")
            .unwrap()
            .unwrap();
        assert_eq!(stats.cycles, 2);
        assert_eq!(
            stats.last_generation,
            Some(GenerationMarker::from_bytes("gen-2"))
        );

        let lines: Vec<String> = std::fs::read_to_string(&log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(lines, ["start gen-1", "end gen-1", "start gen-2", "end gen-2"]);
    }
}
