//! Change propagation between a local tree and an object-store prefix.
//!
//! The producer side runs a [`publisher::Publisher`]: it uploads changed
//! files and, once writes go quiet, advances the generation marker. The
//! consumer side runs a [`poller::Poller`] that watches the marker and a
//! [`fetcher::Fetcher`] that mirrors the full prefix on every new
//! generation. Both sides stop through a shared [`shutdown::Shutdown`] latch.

pub mod error;
pub mod fetcher;
pub mod hook;
pub mod keyspace;
pub mod marker;
pub mod poller;
pub mod publisher;
pub mod shutdown;

pub use error::SyncError;
pub use fetcher::{CycleReport, FetchError, FetchStats, Fetcher, FetcherConfig};
pub use hook::{Hook, HookError};
pub use keyspace::{KeyError, Keyspace};
pub use marker::{GenerationMarker, MARKER_NAME};
pub use poller::{
    trigger_channel, MissingMarker, PollError, PollStats, Poller, PollerConfig,
    DEFAULT_POLL_INTERVAL,
};
pub use publisher::{
    ChangeEvent, PublishError, PublishStats, Publisher, PublisherConfig, DEFAULT_PART_SIZE,
    DEFAULT_QUIET_PERIOD,
};
pub use shutdown::{Outcome, Shutdown, Supervisor};
