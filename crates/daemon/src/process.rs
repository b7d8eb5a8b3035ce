//! Wiring of the two pipelines onto a [`Supervisor`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use common::{
    trigger_channel, Fetcher, FetcherConfig, Hook, Keyspace, MissingMarker, Poller, PollerConfig,
    Publisher, PublisherConfig, Supervisor,
};
use store::Storage;

use crate::source::{ChangeSource, ChangeSourceError};

/// Changes buffered between the watcher and the publisher.
pub const CHANGE_QUEUE_DEPTH: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    ChangeSource(#[from] ChangeSourceError),
    #[error("failed to create mirror base {}: {source}", path.display())]
    CreateBase {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct PublishService {
    pub root: PathBuf,
    pub keyspace: Keyspace,
    pub quiet_period: Duration,
}

#[derive(Debug, Clone)]
pub struct MirrorService {
    pub base: PathBuf,
    pub keyspace: Keyspace,
    pub interval: Duration,
    pub missing_marker: MissingMarker,
    pub hook: Option<Hook>,
}

/// Start the change source and publisher. Returns the canonical watched root.
pub fn spawn_publish(
    storage: &Storage,
    service: PublishService,
    supervisor: &mut Supervisor,
) -> Result<PathBuf, ServiceError> {
    let source = ChangeSource::watch(&service.root)?;
    let root = source.root().to_path_buf();

    let publisher = Publisher::new(
        storage.store(),
        PublisherConfig {
            root: root.clone(),
            keyspace: service.keyspace.clone(),
            quiet_period: service.quiet_period,
        },
    );

    info!(
        root = %root.display(),
        remote = %storage,
        prefix = %service.keyspace.prefix(),
        quiet_period_ms = service.quiet_period.as_millis() as u64,
        "starting publisher"
    );

    let (changes, rx) = flume::bounded(CHANGE_QUEUE_DEPTH);
    let shutdown = supervisor.shutdown().clone();
    supervisor.spawn("change-source", source.run(changes, shutdown.clone()));
    supervisor.spawn("publisher", publisher.run(rx, shutdown));

    Ok(root)
}

/// Create the base directory and start the poller and fetcher.
pub async fn spawn_mirror(
    storage: &Storage,
    service: MirrorService,
    supervisor: &mut Supervisor,
) -> Result<PathBuf, ServiceError> {
    tokio::fs::create_dir_all(&service.base)
        .await
        .map_err(|source| ServiceError::CreateBase {
            path: service.base.clone(),
            source,
        })?;

    let store = storage.store();
    let poller = Poller::new(
        Arc::clone(&store),
        PollerConfig {
            keyspace: service.keyspace.clone(),
            interval: service.interval,
            missing_marker: service.missing_marker,
        },
    );
    let fetcher = Fetcher::new(
        store,
        FetcherConfig {
            keyspace: service.keyspace.clone(),
            base: service.base.clone(),
            hook: service.hook.clone(),
        },
    );

    info!(
        base = %service.base.display(),
        remote = %storage,
        prefix = %service.keyspace.prefix(),
        interval_ms = service.interval.as_millis() as u64,
        hook = ?service.hook.as_ref().map(ToString::to_string),
        "starting mirror"
    );

    let (triggers, rx) = trigger_channel();
    let shutdown = supervisor.shutdown().clone();
    supervisor.spawn("poller", poller.run(triggers, shutdown.clone()));
    supervisor.spawn("fetcher", fetcher.run(rx, shutdown));

    Ok(service.base)
}
