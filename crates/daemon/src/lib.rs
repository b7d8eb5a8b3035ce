// Service modules
pub mod config;
pub mod logging;
pub mod process;
pub mod signal;
pub mod source;

pub use config::{Backend, ConfigError, FileConfig, Remote, RemoteArgs};
pub use process::{spawn_mirror, spawn_publish, MirrorService, PublishService, ServiceError};
pub use signal::Signals;
pub use source::{ChangeSource, ChangeSourceError};
