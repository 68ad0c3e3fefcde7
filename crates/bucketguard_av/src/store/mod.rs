//! Object store abstraction.
//!
//! The pipeline only needs four calls against a bucket store (streamed get,
//! paged list, streamed put, tag replacement) plus a tag read for status
//! queries. Objects are addressed by `(bucket, key)`.
//!
//! Two implementations ship with the crate:
//! - [`LocalObjectStore`]: buckets as directories on a local filesystem
//! - [`MemoryObjectStore`]: in-process store with fault injection, for tests

mod local;
mod memory;

pub use local::LocalObjectStore;
pub use memory::{MemoryObjectStore, TagWrite};

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use tokio::io::AsyncRead;

/// Streamed object content.
pub type ObjectBody = Box<dyn AsyncRead + Send + Unpin>;

/// A key/value label attached to an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One entry of a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Parameters of a single list call.
#[derive(Debug, Clone, Default)]
pub struct ListObjectsRequest {
    pub prefix: Option<String>,
    pub continuation_token: Option<String>,
    pub max_keys: Option<usize>,
}

/// One page of a bucket listing, sorted by key.
#[derive(Debug, Clone, Default)]
pub struct ListObjectsPage {
    pub objects: Vec<ObjectSummary>,
    /// Present when more keys follow this page
    pub next_continuation_token: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a read stream on the object's content.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, StoreError>;

    /// List one page of objects in a bucket.
    async fn list_objects(
        &self,
        bucket: &str,
        request: ListObjectsRequest,
    ) -> Result<ListObjectsPage, StoreError>;

    /// Store the body under `key`, replacing any previous object and its tags.
    /// Returns the new version id on versioned stores.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectBody,
    ) -> Result<Option<String>, StoreError>;

    /// Replace the object's whole tag set. Returns the tagged version id on
    /// versioned stores.
    async fn put_object_tagging(
        &self,
        bucket: &str,
        key: &str,
        tags: Vec<Tag>,
    ) -> Result<Option<String>, StoreError>;

    async fn get_object_tagging(&self, bucket: &str, key: &str) -> Result<Vec<Tag>, StoreError>;
}

/// List every object in `bucket`, following continuation tokens.
pub async fn list_all_objects(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: Option<&str>,
) -> Result<Vec<ObjectSummary>, StoreError> {
    let mut objects = Vec::new();
    let mut continuation_token = None;

    loop {
        let page = store
            .list_objects(
                bucket,
                ListObjectsRequest {
                    prefix: prefix.map(str::to_string),
                    continuation_token: continuation_token.take(),
                    max_keys: None,
                },
            )
            .await?;
        objects.extend(page.objects);

        match page.next_continuation_token {
            Some(token) => continuation_token = Some(token),
            None => break,
        }
    }

    Ok(objects)
}

/// Bucket names map onto a single directory component.
pub(crate) fn validate_bucket(bucket: &str) -> Result<(), StoreError> {
    if bucket.is_empty() {
        return Err(StoreError::invalid_name("bucket name is empty"));
    }
    if bucket.starts_with('.') || bucket.contains(['/', '\\']) {
        return Err(StoreError::invalid_name(format!("bucket {:?}", bucket)));
    }
    Ok(())
}

/// Keys are relative `/`-separated paths without `.` or `..` segments.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::invalid_name("object key is empty"));
    }
    if key.contains('\\') || key.ends_with('/') {
        return Err(StoreError::invalid_name(format!("key {:?}", key)));
    }
    let all_normal = Path::new(key)
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if !all_normal || key.split('/').any(|segment| segment.is_empty() || segment == ".") {
        return Err(StoreError::invalid_name(format!("key {:?}", key)));
    }
    Ok(())
}
