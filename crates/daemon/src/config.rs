//! Configuration file and remote store resolution.
//!
//! Every setting can come from three places. The command line wins, then the
//! `PADSYNC_*` environment (handled by clap), then the TOML config file, then
//! the built-in default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, ValueEnum};
use serde::Deserialize;

use common::Keyspace;
use store::ObjectStoreConfig;

/// File name looked up under the user config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Directory under the mirror's working directory used when no base is given.
pub const DEFAULT_BASE_DIR_NAME: &str = "remote-files";
const DEFAULT_PREFIX_ROOT: &str = "scratch-pads";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no bucket given; pass --bucket, set PADSYNC_BUCKET or add `bucket` to the config file")]
    MissingBucket,
    #[error("the local backend needs --store-root or `store_root` in the config file")]
    MissingStoreRoot,
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

/// Which object store backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// S3 or an S3-compatible service
    #[default]
    S3,
    /// A directory on this machine, for offline runs
    Local,
    /// In-process memory, lost on exit
    Memory,
}

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub backend: Option<Backend>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub allow_http: Option<bool>,
    pub store_root: Option<PathBuf>,
    pub quiet_period_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub base: Option<PathBuf>,
    pub allow_missing_marker: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Load `explicit` if given, else the default location if a file exists
    /// there, else an empty config. Returns the path that was read.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|path| path.is_file()),
        };
        match path {
            Some(path) => {
                let config = Self::load(&path)?;
                tracing::debug!(path = %path.display(), "loaded config file");
                Ok((config, Some(path)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    pub fn quiet_period(&self, flag_ms: Option<u64>) -> Duration {
        flag_ms
            .or(self.quiet_period_ms)
            .map(Duration::from_millis)
            .unwrap_or(common::DEFAULT_QUIET_PERIOD)
    }

    pub fn poll_interval(&self, flag_ms: Option<u64>) -> Duration {
        flag_ms
            .or(self.poll_interval_ms)
            .map(Duration::from_millis)
            .unwrap_or(common::DEFAULT_POLL_INTERVAL)
    }

    pub fn base(&self, flag: Option<&Path>) -> Result<PathBuf, ConfigError> {
        match flag.map(Path::to_path_buf).or_else(|| self.base.clone()) {
            Some(base) => Ok(base),
            None => default_base(),
        }
    }
}

/// `<config dir>/padsync/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("padsync").join(CONFIG_FILE_NAME))
}

/// `scratch-pads/<username>`
pub fn default_prefix() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown-user".to_string());
    format!("{DEFAULT_PREFIX_ROOT}/{user}")
}

/// `<cwd>/remote-files`
pub fn default_base() -> Result<PathBuf, ConfigError> {
    let cwd = std::env::current_dir().map_err(ConfigError::CurrentDir)?;
    Ok(cwd.join(DEFAULT_BASE_DIR_NAME))
}

/// Store selection flags shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct RemoteArgs {
    /// Bucket holding the published tree
    #[arg(long, global = true, env = "PADSYNC_BUCKET")]
    pub bucket: Option<String>,

    /// Key prefix inside the bucket (default: scratch-pads/<username>)
    #[arg(long, global = true, env = "PADSYNC_PREFIX")]
    pub prefix: Option<String>,

    /// Object store backend
    #[arg(long, global = true, value_enum, env = "PADSYNC_BACKEND")]
    pub backend: Option<Backend>,

    /// Custom S3 endpoint, e.g. http://localhost:9000 for MinIO
    #[arg(long, global = true, env = "PADSYNC_ENDPOINT")]
    pub endpoint: Option<String>,

    /// S3 region
    #[arg(long, global = true, env = "PADSYNC_REGION")]
    pub region: Option<String>,

    /// Allow plain-HTTP endpoints
    #[arg(long, global = true, env = "PADSYNC_ALLOW_HTTP")]
    pub allow_http: bool,

    /// Root directory of the local backend
    #[arg(long, global = true, env = "PADSYNC_STORE_ROOT")]
    pub store_root: Option<PathBuf>,
}

/// Where the remote tree lives once flags and config are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub storage: ObjectStoreConfig,
    pub keyspace: Keyspace,
}

impl RemoteArgs {
    pub fn resolve(&self, file: &FileConfig) -> Result<Remote, ConfigError> {
        let backend = self.backend.or(file.backend).unwrap_or_default();

        let storage = match backend {
            Backend::S3 => ObjectStoreConfig::S3 {
                bucket: self
                    .bucket
                    .clone()
                    .or_else(|| file.bucket.clone())
                    .ok_or(ConfigError::MissingBucket)?,
                region: self.region.clone().or_else(|| file.region.clone()),
                endpoint: self.endpoint.clone().or_else(|| file.endpoint.clone()),
                access_key: None,
                secret_key: None,
                allow_http: self.allow_http || file.allow_http.unwrap_or(false),
            },
            Backend::Local => ObjectStoreConfig::Local {
                path: self
                    .store_root
                    .clone()
                    .or_else(|| file.store_root.clone())
                    .ok_or(ConfigError::MissingStoreRoot)?,
            },
            Backend::Memory => ObjectStoreConfig::Memory,
        };

        let prefix = self
            .prefix
            .clone()
            .or_else(|| file.prefix.clone())
            .unwrap_or_else(default_prefix);

        Ok(Remote {
            storage,
            keyspace: Keyspace::new(&prefix),
        })
    }
}
