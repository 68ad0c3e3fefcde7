//! Moves object content between the store and local scratch files.

use crate::error::StageError;
use crate::store::ObjectStore;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ObjectStager {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStager {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Copy the object's content into `local_path` and return the byte count.
    ///
    /// Returns only after the body stream reached end-of-data and the file was
    /// flushed and synced, or with the first read/write error.
    pub async fn stage(&self, bucket: &str, key: &str, local_path: &Path) -> Result<u64, StageError> {
        let mut body = self
            .store
            .get_object(bucket, key)
            .await
            .map_err(StageError::Fetch)?;

        let mut file = File::create(local_path)
            .await
            .map_err(|source| StageError::CreateLocal {
                path: local_path.to_path_buf(),
                source,
            })?;

        let transfer = async {
            let bytes = tokio::io::copy(&mut body, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, io::Error>(bytes)
        };
        let bytes = transfer.await.map_err(|source| StageError::Transfer {
            path: local_path.to_path_buf(),
            source,
        })?;

        debug!(bucket, key, bytes, path = %local_path.display(), "Object staged");
        Ok(bytes)
    }

    /// Upload a local file as `key`. Returns the new version id on versioned stores.
    pub async fn publish(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<Option<String>, StageError> {
        let file = File::open(local_path)
            .await
            .map_err(|source| StageError::OpenLocal {
                path: local_path.to_path_buf(),
                source,
            })?;
        let version_id = self
            .store
            .put_object(bucket, key, Box::new(file))
            .await
            .map_err(StageError::Upload)?;

        debug!(bucket, key, path = %local_path.display(), "Object published");
        Ok(version_id)
    }
}

/// Delete a staged file. An already-absent file is not an error.
pub async fn unstage(local_path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(local_path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Exclusive claim on a caller-supplied scratch path for one scan.
///
/// Call [`ScratchFile::release`] on every path out of the scan. If the claim
/// is dropped unreleased (the scan future was cancelled, or a panic unwound
/// through it) the file is removed synchronously instead.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    armed: bool,
}

impl ScratchFile {
    pub fn claim(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file. A failure is returned to the caller, not retried on drop.
    pub async fn release(mut self) -> io::Result<()> {
        self.armed = false;
        unstage(&self.path).await
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path.display(), "Failed to remove scratch file: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryObjectStore;

    #[tokio::test]
    async fn test_stage_writes_full_body() {
        let store = MemoryObjectStore::new();
        let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        store.insert_object("b", "big.bin", body.clone());
        let stager = ObjectStager::new(Arc::new(store));

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("scratch");
        let bytes = stager.stage("b", "big.bin", &path).await.unwrap();

        assert_eq!(bytes, body.len() as u64);
        assert_eq!(std::fs::read(&path).unwrap(), body);
    }

    #[tokio::test]
    async fn test_stage_missing_object_creates_no_file() {
        let store = MemoryObjectStore::new();
        store.create_bucket("b");
        let stager = ObjectStager::new(Arc::new(store));

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("scratch");
        let err = stager.stage("b", "missing", &path).await.unwrap_err();

        assert!(matches!(err, StageError::Fetch(StoreError::NotFound { .. })));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_stage_into_missing_directory_fails() {
        let store = MemoryObjectStore::new();
        store.insert_object("b", "k", b"x".to_vec());
        let stager = ObjectStager::new(Arc::new(store));

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("no-such-dir").join("scratch");
        let err = stager.stage("b", "k", &path).await.unwrap_err();
        assert!(matches!(err, StageError::CreateLocal { .. }));
    }

    #[tokio::test]
    async fn test_publish_round_trips_through_store() {
        let store = MemoryObjectStore::new();
        store.create_bucket("defs");
        let stager = ObjectStager::new(Arc::new(store.clone()));

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("main.cvd");
        std::fs::write(&path, b"signatures").unwrap();
        stager.publish("defs", "main.cvd", &path).await.unwrap();

        assert_eq!(store.object_body("defs", "main.cvd"), Some(b"signatures".to_vec()));
    }

    #[tokio::test]
    async fn test_unstage_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("scratch");
        std::fs::write(&path, b"x").unwrap();

        unstage(&path).await.unwrap();
        unstage(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_scratch_file_removed_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("scratch");
        std::fs::write(&path, b"x").unwrap();

        drop(ScratchFile::claim(&path));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_scratch_file_release_without_file() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::claim(tmp.path().join("never-written"));
        scratch.release().await.unwrap();
    }
}
