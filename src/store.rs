//! Durable fixture storage.

use crate::error::StoreError;
use crate::key::FixtureKey;
use async_trait::async_trait;
use rand::Rng;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Storage backend for fixtures.
///
/// Absence is a normal outcome of `exists`, never an error. Writes replace
/// the whole record.
#[async_trait]
pub trait FixtureStore: Send + Sync {
    async fn exists(&self, key: &FixtureKey) -> Result<bool, StoreError>;

    async fn read(&self, key: &FixtureKey) -> Result<Vec<u8>, StoreError>;

    async fn write(&self, key: &FixtureKey, bytes: Vec<u8>) -> Result<(), StoreError>;
}

/// Fixtures stored as plain files, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct FsFixtureStore;

impl FsFixtureStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FixtureStore for FsFixtureStore {
    async fn exists(&self, key: &FixtureKey) -> Result<bool, StoreError> {
        match tokio::fs::metadata(key.path()).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Exists {
                path: key.path().to_path_buf(),
                source,
            }),
        }
    }

    async fn read(&self, key: &FixtureKey) -> Result<Vec<u8>, StoreError> {
        tokio::fs::read(key.path()).await.map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                StoreError::NotFound(key.path().to_path_buf())
            } else {
                StoreError::Read {
                    path: key.path().to_path_buf(),
                    source,
                }
            }
        })
    }

    async fn write(&self, key: &FixtureKey, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = key.path();
        let write_err = |source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        // Concurrent writers each rename a complete file into place.
        let tmp = temp_sibling(key);
        if let Err(source) = tokio::fs::write(&tmp, &bytes).await {
            return Err(write_err(source));
        }
        if let Err(source) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_err(source));
        }
        Ok(())
    }
}

/// Short temporary name in the key's directory, so long keys still fit.
fn temp_sibling(key: &FixtureKey) -> PathBuf {
    let suffix: u64 = rand::thread_rng().gen();
    key.path().with_file_name(format!(".{suffix:016x}.tmp"))
}
