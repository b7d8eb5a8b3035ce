use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use tracing::info;

use crate::error::{Result, StorageError};

/// Which backend to talk to and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectStoreConfig {
    /// S3 or an S3-compatible service.
    ///
    /// Anything left unset falls back to the `AWS_*` environment
    /// (`AWS_REGION`, `AWS_ENDPOINT`, `AWS_ACCESS_KEY_ID`, ...).
    S3 {
        bucket: String,
        region: Option<String>,
        endpoint: Option<String>,
        access_key: Option<String>,
        secret_key: Option<String>,
        allow_http: bool,
    },
    /// A directory on the local filesystem. Created if missing.
    Local { path: PathBuf },
    /// Process-local, lost on exit.
    Memory,
}

/// A connected object store plus the config it was built from.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<dyn ObjectStore>,
    config: ObjectStoreConfig,
}

impl Storage {
    pub fn new(config: ObjectStoreConfig) -> Result<Self> {
        let inner: Arc<dyn ObjectStore> = match &config {
            ObjectStoreConfig::S3 {
                bucket,
                region,
                endpoint,
                access_key,
                secret_key,
                allow_http,
            } => {
                if bucket.is_empty() {
                    return Err(StorageError::MissingBucket);
                }

                let mut builder = AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .with_allow_http(*allow_http);
                if let Some(region) = region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                if let Some(key) = access_key {
                    builder = builder.with_access_key_id(key);
                }
                if let Some(secret) = secret_key {
                    builder = builder.with_secret_access_key(secret);
                }
                Arc::new(builder.build()?)
            }
            ObjectStoreConfig::Local { path } => {
                std::fs::create_dir_all(path).map_err(|source| StorageError::LocalRoot {
                    path: path.clone(),
                    source,
                })?;
                Arc::new(LocalFileSystem::new_with_prefix(path)?)
            }
            ObjectStoreConfig::Memory => Arc::new(InMemory::new()),
        };

        let storage = Self { inner, config };
        info!(backend = %storage, "object store ready");
        Ok(storage)
    }

    /// Shared handle for the workers.
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.inner.clone()
    }

    pub fn config(&self) -> &ObjectStoreConfig {
        &self.config
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.config {
            ObjectStoreConfig::S3 {
                bucket, endpoint, ..
            } => match endpoint {
                Some(endpoint) => write!(f, "s3://{bucket} via {endpoint}"),
                None => write!(f, "s3://{bucket}"),
            },
            ObjectStoreConfig::Local { path } => write!(f, "file://{}", path.display()),
            ObjectStoreConfig::Memory => write!(f, "memory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::path::Path;
    use object_store::PutPayload;

    fn s3(bucket: &str) -> ObjectStoreConfig {
        ObjectStoreConfig::S3 {
            bucket: bucket.to_string(),
            region: Some("us-east-1".to_string()),
            endpoint: Some("http://localhost:9000".to_string()),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            allow_http: true,
        }
    }

    #[tokio::test]
    async fn test_memory_backend_round_trip() {
        let storage = Storage::new(ObjectStoreConfig::Memory).unwrap();
        let store = storage.store();

        let key = Path::from("pads/notes.txt");
        store.put(&key, PutPayload::from("hello")).await.unwrap();
        let body = store.get(&key).await.unwrap().bytes().await.unwrap();
        assert_eq!(body, bytes::Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_local_backend_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested/store");

        let storage = Storage::new(ObjectStoreConfig::Local { path: root.clone() }).unwrap();
        assert!(root.is_dir());

        storage
            .store()
            .put(&Path::from("pads/a/b.txt"), PutPayload::from("x"))
            .await
            .unwrap();
        assert_eq!(std::fs::read(root.join("pads/a/b.txt")).unwrap(), b"x");
    }

    #[test]
    fn test_s3_requires_bucket() {
        let err = Storage::new(s3("")).unwrap_err();
        assert!(matches!(err, StorageError::MissingBucket));
    }

    #[test]
    fn test_s3_builds_without_connecting() {
        let storage = Storage::new(s3("pads")).unwrap();
        assert_eq!(storage.to_string(), "s3://pads via http://localhost:9000");
        assert_eq!(storage.config(), &s3("pads"));
    }

    #[test]
    fn test_display_local_and_memory() {
        let dir = tempfile::tempdir().unwrap();
        let local = Storage::new(ObjectStoreConfig::Local {
            path: dir.path().to_path_buf(),
        })
        .unwrap();
        assert_eq!(local.to_string(), format!("file://{}", dir.path().display()));

        let memory = Storage::new(ObjectStoreConfig::Memory).unwrap();
        assert_eq!(memory.to_string(), "memory");
    }
}
