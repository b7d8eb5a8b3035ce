use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

use padsync_daemon::RemoteArgs;

pub mod op;
pub mod ops;

pub use op::{Op, OpContext};

crate::command_enum! {
    /// Watch a local tree and publish every change
    #[command(visible_alias = "editor")]
    (Publish, ops::Publish),
    /// Mirror the published tree and run a hook after every update
    #[command(visible_alias = "watcher")]
    (Mirror, ops::Mirror),
    /// Print version information
    (Version, ops::Version),
}

#[derive(Parser, Debug)]
#[command(name = "padsync", version, about = "Propagate a scratch tree through S3")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (default: <config dir>/padsync/config.toml if present)
    #[arg(long, global = true, env = "PADSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Default log level; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info", env = "PADSYNC_LOG_LEVEL")]
    pub log_level: Level,

    /// Also write a daily rolling log file to this directory
    #[arg(long, global = true, env = "PADSYNC_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(flatten)]
    pub remote: RemoteArgs,
}
