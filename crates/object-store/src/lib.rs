//! Object storage backends for padsync
//!
//! Resolves an [`ObjectStoreConfig`] into a shared `Arc<dyn ObjectStore>`.
//! S3 and S3-compatible services (MinIO, R2) take their credentials from the
//! standard `AWS_*` environment unless keys are given explicitly. The local
//! filesystem and in-memory backends exist for single-host setups and tests.

mod error;
mod storage;

pub use error::{Result, StorageError};
pub use storage::{ObjectStoreConfig, Storage};
