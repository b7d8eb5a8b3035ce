//! Post-update hook

use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tracing::info;

use crate::marker::GenerationMarker;

/// Environment variable carrying the generation that triggered the cycle.
pub const GENERATION_ENV: &str = "PADSYNC_GENERATION";
/// Environment variable carrying the mirror base directory.
pub const BASE_ENV: &str = "PADSYNC_BASE";

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("failed to spawn post-update hook {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("post-update hook {program} exited with {status}")]
    Failed { program: String, status: ExitStatus },
}

/// External command run after every successful fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    program: String,
    args: Vec<String>,
}

impl Hook {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the hook to completion with inherited stdout and stderr.
    pub async fn run(&self, generation: &GenerationMarker, base: &Path) -> Result<(), HookError> {
        info!(hook = %self, generation = %generation, "running post-update hook");

        let status = Command::new(&self.program)
            .args(&self.args)
            .env(GENERATION_ENV, generation.to_string())
            .env(BASE_ENV, base)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| HookError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(HookError::Failed {
                program: self.program.clone(),
                status,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
