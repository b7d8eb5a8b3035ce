use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("no bucket configured for the s3 backend")]
    MissingBucket,

    #[error("failed to prepare local store root {}: {source}", path.display())]
    LocalRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, StorageError>;
