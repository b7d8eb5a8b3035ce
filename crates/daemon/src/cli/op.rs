use std::fmt;
use std::path::PathBuf;

use padsync_daemon::{ConfigError, FileConfig, RemoteArgs};

/// Everything an op needs beyond its own arguments.
#[derive(Debug, Clone)]
pub struct OpContext {
    pub config: FileConfig,
    pub config_path: Option<PathBuf>,
    pub remote: RemoteArgs,
}

impl OpContext {
    pub fn load(config_path: Option<PathBuf>, remote: RemoteArgs) -> Result<Self, ConfigError> {
        let (config, config_path) = FileConfig::discover(config_path.as_deref())?;
        Ok(Self {
            config,
            config_path,
            remote,
        })
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;
    type Output: fmt::Display + fmt::Debug + Send;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

/// Generate a `Command` subcommand enum plus matching `OpOutput` and `OpError`
/// enums, and an `Op` impl that dispatches to each variant.
#[macro_export]
macro_rules! command_enum {
    ($( $(#[$meta:meta])* ($variant:ident, $ty:ty) ),* $(,)?) => {
        #[derive(clap::Subcommand, Debug, Clone)]
        pub enum Command {
            $( $(#[$meta])* $variant($ty), )*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $( $variant(<$ty as $crate::cli::op::Op>::Output), )*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$ty as $crate::cli::op::Op>::Error),
            )*
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $( OpOutput::$variant(output) => write!(f, "{output}"), )*
                }
            }
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Error = OpError;
            type Output = OpOutput;

            async fn execute(
                &self,
                ctx: &$crate::cli::op::OpContext,
            ) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => op
                            .execute(ctx)
                            .await
                            .map(OpOutput::$variant)
                            .map_err(OpError::$variant),
                    )*
                }
            }
        }
    };
}
