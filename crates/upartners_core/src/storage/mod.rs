//! File store for generated export spreadsheets.
//!
//! # Invariants
//! - Stored names are relative, `/`-separated and never escape the root.
//! - Saving an existing name overwrites it.

use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Component, Path, PathBuf};

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug)]
pub enum StorageError {
    InvalidName(String),
    NotFound(String),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid storage name `{name}`"),
            Self::NotFound(name) => write!(f, "stored file not found: {name}"),
            Self::Io { path, source } => {
                write!(f, "storage i/o error at `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub trait FileStore {
    /// Saves `content` under `name` and returns the stored name.
    fn save(&self, name: &str, content: &[u8]) -> StorageResult<String>;
    fn open(&self, name: &str) -> StorageResult<Vec<u8>>;
    fn exists(&self, name: &str) -> StorageResult<bool>;
}

/// Filesystem-backed store rooted at one directory.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(name);
        let is_plain = !name.trim().is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !is_plain {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl FileStore for LocalFileStore {
    fn save(&self, name: &str, content: &[u8]) -> StorageResult<String> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&path, content).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        info!(
            "event=file_store_save module=storage status=ok bytes={}",
            content.len()
        );
        Ok(name.to_string())
    }

    fn open(&self, name: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(name)?;
        match std::fs::read(&path) {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.resolve(name)?.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::{FileStore, LocalFileStore, StorageError};

    #[test]
    fn save_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        let name = store
            .save("orgs/1/message_exports/abc.xlsx", b"data")
            .unwrap();
        assert_eq!(store.open(&name).unwrap(), b"data");
        assert!(store.exists(&name).unwrap());
    }

    #[test]
    fn names_escaping_root_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        for name in ["../evil", "/etc/passwd", "a/../../b", ""] {
            let err = store.save(name, b"x").unwrap_err();
            assert!(matches!(err, StorageError::InvalidName(_)), "{name}");
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        let err = store.open("nope.xlsx").unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
