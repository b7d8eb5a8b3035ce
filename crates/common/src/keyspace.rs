//! Mapping between local paths and remote object keys.

use std::path::{Component, Path as FsPath, PathBuf};

use object_store::path::Path;

use crate::marker::MARKER_NAME;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("{} is not under watched root {}", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },
    #[error("{} contains a component that is not valid UTF-8", .0.display())]
    NonUtf8(PathBuf),
    #[error("{} does not name a file under the watched root", .0.display())]
    NoFileName(PathBuf),
    #[error("key {key} is not under prefix {prefix}")]
    OutsidePrefix { key: Path, prefix: Path },
    #[error("key {0} has no path relative to the prefix")]
    NoRelativePath(Path),
    #[error("{} cannot be used as an object key: {source}", path.display())]
    InvalidKey {
        path: PathBuf,
        #[source]
        source: object_store::path::Error,
    },
}

/// A key prefix in the remote store.
///
/// Regular objects live at `prefix/<relative path>`, the generation marker
/// at `prefix/__lock__timer__`. Segments are kept verbatim on both sides,
/// so a name like `notes.txt~` is stored under `prefix/notes.txt~`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    prefix: Path,
}

impl Keyspace {
    pub fn new(prefix: &str) -> Self {
        // fall back to the escaping constructor for prefixes with empty or
        // dot segments
        let prefix = Path::parse(prefix).unwrap_or_else(|_| Path::from(prefix));
        Self { prefix }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn marker_key(&self) -> Path {
        self.prefix.child(MARKER_NAME)
    }

    /// Remote key for a file at `path` inside the watched `root`.
    pub fn remote_key(&self, root: &FsPath, path: &FsPath) -> Result<Path, KeyError> {
        let outside = || KeyError::OutsideRoot {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        };
        let relative = path.strip_prefix(root).map_err(|_| outside())?;

        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    let part = part
                        .to_str()
                        .ok_or_else(|| KeyError::NonUtf8(path.to_path_buf()))?;
                    parts.push(part);
                }
                Component::CurDir => {}
                _ => return Err(outside()),
            }
        }
        if parts.is_empty() {
            return Err(KeyError::NoFileName(path.to_path_buf()));
        }

        let relative =
            Path::parse(parts.join("/")).map_err(|source| KeyError::InvalidKey {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Path::from_iter(self.prefix.parts().chain(relative.parts())))
    }

    /// Local path under `base` for a listed remote `key`.
    pub fn local_path(&self, base: &FsPath, key: &Path) -> Result<PathBuf, KeyError> {
        let parts = key
            .prefix_match(&self.prefix)
            .ok_or_else(|| KeyError::OutsidePrefix {
                key: key.clone(),
                prefix: self.prefix.clone(),
            })?;

        let mut local = base.to_path_buf();
        let mut depth = 0;
        for part in parts {
            if part.as_ref().is_empty() {
                continue;
            }
            local.push(part.as_ref());
            depth += 1;
        }
        if depth == 0 {
            return Err(KeyError::NoRelativePath(key.clone()));
        }
        Ok(local)
    }
}
