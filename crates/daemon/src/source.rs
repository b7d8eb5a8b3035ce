//! Change source
//!
//! Watches a local tree with `notify` and turns data-modification events on
//! regular files into [`ChangeEvent`]s. Every directory present at startup is
//! registered on its own, non-recursively; directories created afterwards are
//! not watched until the next start.

use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, trace};
use walkdir::WalkDir;

use common::{ChangeEvent, Shutdown, SyncError};

#[derive(Debug, thiserror::Error)]
pub enum ChangeSourceError {
    #[error("failed to resolve watched root {}: {source}", path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk {}: {source}", root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("failed to watch {}: {source}", path.display())]
    Register {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("file watcher failed: {0}")]
    Watch(#[source] notify::Error),
    #[error("file watcher stopped unexpectedly")]
    Closed,
}

impl From<ChangeSourceError> for SyncError {
    fn from(err: ChangeSourceError) -> Self {
        SyncError::ChangeSource(Box::new(err))
    }
}

pub struct ChangeSource {
    root: PathBuf,
    directories: usize,
    // dropping the watcher stops event delivery
    _watcher: RecommendedWatcher,
    events: flume::Receiver<notify::Result<Event>>,
}

impl ChangeSource {
    /// Canonicalize `root` and register every directory under it.
    pub fn watch(root: &Path) -> Result<Self, ChangeSourceError> {
        let root = root.canonicalize().map_err(|source| ChangeSourceError::Root {
            path: root.to_path_buf(),
            source,
        })?;

        let (tx, events) = flume::unbounded();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(ChangeSourceError::Watch)?;

        let mut directories = 0;
        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = entry.map_err(|source| ChangeSourceError::Walk {
                root: root.clone(),
                source,
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            watcher
                .watch(entry.path(), RecursiveMode::NonRecursive)
                .map_err(|source| ChangeSourceError::Register {
                    path: entry.path().to_path_buf(),
                    source,
                })?;
            directories += 1;
        }

        info!(root = %root.display(), directories, "watching local tree");
        Ok(Self {
            root,
            directories,
            _watcher: watcher,
            events,
        })
    }

    /// The canonical watched root. Keys are derived relative to it.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn directories(&self) -> usize {
        self.directories
    }

    /// Forward changes until shutdown. Returns the number forwarded.
    pub async fn run(
        self,
        changes: flume::Sender<ChangeEvent>,
        shutdown: Shutdown,
    ) -> Result<u64, ChangeSourceError> {
        let mut forwarded = 0;

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = self.events.recv_async() => match event {
                    Ok(Ok(event)) => event,
                    Ok(Err(err)) => return Err(ChangeSourceError::Watch(err)),
                    Err(_) => return Err(ChangeSourceError::Closed),
                },
            };

            if !is_data_change(&event.kind) {
                trace!(kind = ?event.kind, "ignoring event");
                continue;
            }

            for path in event.paths {
                if !path.is_file() {
                    continue;
                }
                debug!(path = %path.display(), "local change");
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => return Ok(forwarded),
                    sent = changes.send_async(ChangeEvent::new(path)) => {
                        if sent.is_err() {
                            debug!("publisher gone, stopping change source");
                            return Ok(forwarded);
                        }
                        forwarded += 1;
                    }
                }
            }
        }

        Ok(forwarded)
    }
}

fn is_data_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
    )
}
