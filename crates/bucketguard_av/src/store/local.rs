//! Filesystem-backed object store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<bucket>/<key>              object content
//! <root>/.meta/<bucket>/<key>.json   {version_id, tags}
//! ```
//!
//! Writes go through a temp file in `<root>/.meta/.tmp` and are renamed into
//! place, so readers never observe a half-written object or tag set.

use super::{
    validate_bucket, validate_key, ListObjectsPage, ListObjectsRequest, ObjectBody, ObjectStore,
    ObjectSummary, Tag,
};
use crate::defaults::DEFAULT_MAX_KEYS;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const META_DIR: &str = ".meta";
const TMP_DIR: &str = ".tmp";

/// Per-object metadata persisted next to the content.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ObjectMeta {
    version_id: Option<String>,
    tags: Vec<Tag>,
}

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    versioned: bool,
    max_keys: usize,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            versioned: false,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }

    /// Assign a fresh version id on every `put_object`.
    pub fn versioned(mut self, versioned: bool) -> Self {
        self.versioned = versioned;
        self
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys.max(1);
        self
    }

    pub async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        validate_bucket(bucket)?;
        fs::create_dir_all(self.root.join(bucket)).await?;
        Ok(())
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        validate_bucket(bucket)?;
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.bucket_dir(bucket)?.join(key))
    }

    fn meta_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root
            .join(META_DIR)
            .join(bucket)
            .join(format!("{}.json", key))
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        let dir = self.bucket_dir(bucket)?;
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(StoreError::NoSuchBucket(bucket.to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NoSuchBucket(bucket.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Resolve an existing object, distinguishing a missing bucket from a missing key.
    async fn existing_object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        self.ensure_bucket(bucket).await?;
        let path = self.object_path(bucket, key)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(StoreError::not_found(bucket, key)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::not_found(bucket, key))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn read_meta(&self, bucket: &str, key: &str) -> Result<ObjectMeta, StoreError> {
        match fs::read(self.meta_path(bucket, key)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(ObjectMeta::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_meta(&self, bucket: &str, key: &str, meta: &ObjectMeta) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(meta)?;
        let staging = self.temp_path().await?;
        fs::write(&staging, json).await?;
        self.rename_into_place(&staging, &self.meta_path(bucket, key)).await
    }

    async fn temp_path(&self) -> Result<PathBuf, StoreError> {
        let dir = self.root.join(META_DIR).join(TMP_DIR);
        fs::create_dir_all(&dir).await?;
        Ok(dir.join(uuid::Uuid::new_v4().to_string()))
    }

    async fn rename_into_place(&self, staging: &Path, target: &Path) -> Result<(), StoreError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Err(err) = fs::rename(staging, target).await {
            let _ = fs::remove_file(staging).await;
            return Err(err.into());
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, StoreError> {
        let path = self.existing_object_path(bucket, key).await?;
        let file = fs::File::open(&path).await?;
        Ok(Box::new(file))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        request: ListObjectsRequest,
    ) -> Result<ListObjectsPage, StoreError> {
        let dir = self.ensure_bucket(bucket).await?;
        let max_keys = request.max_keys.unwrap_or(self.max_keys).max(1);

        let mut objects = tokio::task::spawn_blocking(move || walk_bucket(&dir))
            .await
            .map_err(|err| StoreError::Io(io::Error::new(io::ErrorKind::Other, err)))??;
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        let mut remaining = objects.into_iter().filter(|object| {
            request
                .prefix
                .as_deref()
                .map_or(true, |prefix| object.key.starts_with(prefix))
                && request
                    .continuation_token
                    .as_deref()
                    .map_or(true, |after| object.key.as_str() > after)
        });

        let page: Vec<ObjectSummary> = remaining.by_ref().take(max_keys).collect();
        let next_continuation_token = match remaining.next() {
            Some(_) => page.last().map(|object| object.key.clone()),
            None => None,
        };

        Ok(ListObjectsPage {
            objects: page,
            next_continuation_token,
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut body: ObjectBody,
    ) -> Result<Option<String>, StoreError> {
        self.ensure_bucket(bucket).await?;
        let target = self.object_path(bucket, key)?;

        let staging = self.temp_path().await?;
        let mut file = fs::File::create(&staging).await?;
        let copied = async {
            let bytes = tokio::io::copy(&mut body, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, io::Error>(bytes)
        }
        .await;
        drop(file);
        let bytes = match copied {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = fs::remove_file(&staging).await;
                return Err(err.into());
            }
        };
        self.rename_into_place(&staging, &target).await?;

        let meta = ObjectMeta {
            version_id: self.versioned.then(|| uuid::Uuid::new_v4().to_string()),
            tags: Vec::new(),
        };
        self.write_meta(bucket, key, &meta).await?;

        debug!(bucket, key, bytes, "Stored object");
        Ok(meta.version_id)
    }

    async fn put_object_tagging(
        &self,
        bucket: &str,
        key: &str,
        tags: Vec<Tag>,
    ) -> Result<Option<String>, StoreError> {
        self.existing_object_path(bucket, key).await?;
        let mut meta = self.read_meta(bucket, key).await?;
        meta.tags = tags;
        self.write_meta(bucket, key, &meta).await?;
        Ok(meta.version_id)
    }

    async fn get_object_tagging(&self, bucket: &str, key: &str) -> Result<Vec<Tag>, StoreError> {
        self.existing_object_path(bucket, key).await?;
        Ok(self.read_meta(bucket, key).await?.tags)
    }
}

fn walk_bucket(dir: &Path) -> Result<Vec<ObjectSummary>, StoreError> {
    let mut objects = Vec::new();
    for entry in walkdir::WalkDir::new(dir).min_depth(1) {
        let entry = entry.map_err(|err| {
            StoreError::Io(
                err.into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "directory walk failed")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = match entry.path().strip_prefix(dir) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let key = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let metadata = entry.metadata().map_err(|err| {
            StoreError::Io(
                err.into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "metadata unavailable")),
            )
        })?;
        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        objects.push(ObjectSummary {
            key,
            size: metadata.len(),
            last_modified,
        });
    }
    Ok(objects)
}
