//! Termination signals
//!
//! SIGHUP, SIGINT, SIGTERM and SIGQUIT all request a graceful stop. Handlers
//! are installed up front so a signal that arrives during setup is not lost.

use std::convert::Infallible;

use tracing::info;

use common::Shutdown;

#[cfg(unix)]
pub struct Signals {
    hangup: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(not(unix))]
pub struct Signals;

impl Signals {
    #[cfg(unix)]
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    /// Wait for the next termination signal and return its name.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.hangup.recv() => "SIGHUP",
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.quit.recv() => "SIGQUIT",
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl-c",
            // no handler could be registered; never fire
            Err(_) => std::future::pending().await,
        }
    }

    /// Terminate `shutdown` on the first signal. Returns the signal name, or
    /// `None` if the pipeline stopped for another reason first.
    pub async fn listen(mut self, shutdown: Shutdown) -> Result<Option<&'static str>, Infallible> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Ok(None),
            name = self.recv() => {
                info!(signal = name, "received termination signal, shutting down");
                shutdown.terminate();
                Ok(Some(name))
            }
        }
    }
}
