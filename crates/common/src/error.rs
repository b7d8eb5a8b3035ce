use std::convert::Infallible;

use crate::fetcher::FetchError;
use crate::poller::PollError;
use crate::publisher::PublishError;

/// Any fatal error a pipeline worker can raise.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("change source failed: {0}")]
    ChangeSource(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<Infallible> for SyncError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}
