use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use owo_colors::OwoColorize;

use common::{Outcome, Shutdown, Supervisor, SyncError};
use padsync_daemon::{spawn_publish, ConfigError, PublishService, ServiceError, Signals};
use store::{Storage, StorageError};

#[derive(Args, Debug, Clone)]
pub struct Publish {
    /// Directory to watch
    pub root: PathBuf,

    /// Milliseconds without changes before the generation marker advances
    #[arg(long, env = "PADSYNC_QUIET_PERIOD")]
    pub quiet_period: Option<u64>,
}

#[derive(Debug)]
pub struct PublishOutput {
    pub root: PathBuf,
    pub prefix: String,
}

impl fmt::Display for PublishOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} publishing {}",
            "Stopped".green().bold(),
            self.root.display().to_string().bold()
        )?;
        write!(f, "  {} {}", "prefix:".dimmed(), self.prefix)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishOpError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("publisher failed: {0}")]
    Failed(Arc<SyncError>),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Publish {
    type Error = PublishOpError;
    type Output = PublishOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let remote = ctx.remote.resolve(&ctx.config)?;
        let storage = Storage::new(remote.storage)?;
        let signals = Signals::install().map_err(PublishOpError::Signals)?;

        let shutdown = Shutdown::new();
        let mut supervisor = Supervisor::new(shutdown.clone());
        supervisor.spawn("signals", signals.listen(shutdown));

        let service = PublishService {
            root: self.root.clone(),
            keyspace: remote.keyspace.clone(),
            quiet_period: ctx.config.quiet_period(self.quiet_period),
        };
        let root = match spawn_publish(&storage, service, &mut supervisor) {
            Ok(root) => root,
            Err(err) => {
                supervisor.shutdown().terminate();
                supervisor.wait().await;
                return Err(err.into());
            }
        };

        match supervisor.wait().await {
            Outcome::Terminated => Ok(PublishOutput {
                root,
                prefix: remote.keyspace.prefix().to_string(),
            }),
            Outcome::Failed(err) => Err(PublishOpError::Failed(err)),
        }
    }
}
