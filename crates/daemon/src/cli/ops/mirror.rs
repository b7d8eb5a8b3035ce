use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use owo_colors::OwoColorize;

use common::{Hook, MissingMarker, Outcome, Shutdown, Supervisor, SyncError};
use padsync_daemon::{spawn_mirror, ConfigError, MirrorService, ServiceError, Signals};
use store::{Storage, StorageError};

#[derive(Args, Debug, Clone)]
pub struct Mirror {
    /// Command run after every fetched generation, with its arguments
    #[arg(value_name = "HOOK", trailing_var_arg = true, allow_hyphen_values = true)]
    pub hook: Vec<String>,

    /// Local directory receiving the mirror (default: ./remote-files)
    #[arg(long, env = "PADSYNC_BASE")]
    pub base: Option<PathBuf>,

    /// Milliseconds between generation marker reads
    #[arg(long, env = "PADSYNC_INTERVAL")]
    pub interval: Option<u64>,

    /// Keep polling while the generation marker does not exist yet
    #[arg(long)]
    pub allow_missing_marker: bool,
}

impl Mirror {
    fn hook(&self) -> Option<Hook> {
        let (program, args) = self.hook.split_first()?;
        Some(Hook::new(program.clone(), args.to_vec()))
    }
}

#[derive(Debug)]
pub struct MirrorOutput {
    pub base: PathBuf,
    pub prefix: String,
}

impl fmt::Display for MirrorOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} mirroring into {}",
            "Stopped".green().bold(),
            self.base.display().to_string().bold()
        )?;
        write!(f, "  {} {}", "prefix:".dimmed(), self.prefix)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MirrorOpError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("mirror failed: {0}")]
    Failed(Arc<SyncError>),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Mirror {
    type Error = MirrorOpError;
    type Output = MirrorOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let remote = ctx.remote.resolve(&ctx.config)?;
        let storage = Storage::new(remote.storage)?;
        let signals = Signals::install().map_err(MirrorOpError::Signals)?;

        let allow_missing =
            self.allow_missing_marker || ctx.config.allow_missing_marker.unwrap_or(false);
        let service = MirrorService {
            base: ctx.config.base(self.base.as_deref())?,
            keyspace: remote.keyspace.clone(),
            interval: ctx.config.poll_interval(self.interval),
            missing_marker: if allow_missing {
                MissingMarker::Wait
            } else {
                MissingMarker::Fail
            },
            hook: self.hook(),
        };

        let shutdown = Shutdown::new();
        let mut supervisor = Supervisor::new(shutdown.clone());
        supervisor.spawn("signals", signals.listen(shutdown));

        let base = match spawn_mirror(&storage, service, &mut supervisor).await {
            Ok(base) => base,
            Err(err) => {
                supervisor.shutdown().terminate();
                supervisor.wait().await;
                return Err(err.into());
            }
        };

        match supervisor.wait().await {
            Outcome::Terminated => Ok(MirrorOutput {
                base,
                prefix: remote.keyspace.prefix().to_string(),
            }),
            Outcome::Failed(err) => Err(MirrorOpError::Failed(err)),
        }
    }
}
