//! In-memory object store.
//!
//! Records every tag write in order and can be told to fail specific calls,
//! which makes it the standard test double for the scanning pipeline.

use super::{
    validate_bucket, validate_key, ListObjectsPage, ListObjectsRequest, ObjectBody, ObjectStore,
    ObjectSummary, Tag,
};
use crate::defaults::DEFAULT_MAX_KEYS;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// A recorded `put_object_tagging` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagWrite {
    pub bucket: String,
    pub key: String,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    tags: Vec<Tag>,
    version_id: Option<String>,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    buckets: BTreeMap<String, BTreeMap<String, StoredObject>>,
    tag_history: Vec<TagWrite>,
    failing_gets: HashSet<(String, String)>,
    interrupted_bodies: HashSet<(String, String)>,
    failing_puts: HashSet<(String, String)>,
    failing_tagging: HashSet<(String, String, Option<String>)>,
    failing_lists: HashSet<String>,
    next_version: u64,
}

/// Cloning shares the underlying state.
#[derive(Debug, Clone)]
pub struct MemoryObjectStore {
    state: Arc<Mutex<MemoryState>>,
    versioned: bool,
    max_keys: usize,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            versioned: false,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }

    pub fn versioned(mut self, versioned: bool) -> Self {
        self.versioned = versioned;
        self
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.lock().buckets.entry(bucket.to_string()).or_default();
    }

    /// Seed an object directly, creating the bucket if needed.
    pub fn insert_object(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        let mut state = self.lock();
        let version_id = self.allocate_version(&mut state);
        state.buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                body: body.into(),
                tags: Vec::new(),
                version_id,
                last_modified: Utc::now(),
            },
        );
    }

    pub fn object_body(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.body.clone())
    }

    pub fn object_tags(&self, bucket: &str, key: &str) -> Option<Vec<Tag>> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.tags.clone())
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every tag write, successful ones only, in call order.
    pub fn tag_history(&self) -> Vec<TagWrite> {
        self.lock().tag_history.clone()
    }

    pub fn fail_gets_for(&self, bucket: &str, key: &str) {
        self.lock()
            .failing_gets
            .insert((bucket.to_string(), key.to_string()));
    }

    /// Bodies of the object deliver their first half, then fail the read.
    pub fn interrupt_bodies_for(&self, bucket: &str, key: &str) {
        self.lock()
            .interrupted_bodies
            .insert((bucket.to_string(), key.to_string()));
    }

    pub fn fail_puts_for(&self, bucket: &str, key: &str) {
        self.lock()
            .failing_puts
            .insert((bucket.to_string(), key.to_string()));
    }

    /// Fail tag writes on the object; with `value`, only writes setting a tag to that value.
    pub fn fail_tagging_for(&self, bucket: &str, key: &str, value: Option<&str>) {
        self.lock().failing_tagging.insert((
            bucket.to_string(),
            key.to_string(),
            value.map(str::to_string),
        ));
    }

    pub fn fail_lists_for(&self, bucket: &str) {
        self.lock().failing_lists.insert(bucket.to_string());
    }

    fn allocate_version(&self, state: &mut MemoryState) -> Option<String> {
        if !self.versioned {
            return None;
        }
        state.next_version += 1;
        Some(format!("v{}", state.next_version))
    }
}

/// Read side of a connection that dropped mid-transfer.
struct InterruptedBody;

impl AsyncRead for InterruptedBody {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "object body stream interrupted",
        )))
    }
}

fn injected(call: &str, bucket: &str, key: &str) -> StoreError {
    StoreError::Unavailable(format!("{} {}/{} rejected", call, bucket, key))
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, StoreError> {
        let state = self.lock();
        if state
            .failing_gets
            .contains(&(bucket.to_string(), key.to_string()))
        {
            return Err(injected("get", bucket, key));
        }
        let objects = state
            .buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        let object = objects
            .get(key)
            .ok_or_else(|| StoreError::not_found(bucket, key))?;
        if state
            .interrupted_bodies
            .contains(&(bucket.to_string(), key.to_string()))
        {
            let prefix = object.body[..object.body.len() / 2].to_vec();
            return Ok(Box::new(Cursor::new(prefix).chain(InterruptedBody)));
        }
        Ok(Box::new(Cursor::new(object.body.clone())))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        request: ListObjectsRequest,
    ) -> Result<ListObjectsPage, StoreError> {
        let state = self.lock();
        if state.failing_lists.contains(bucket) {
            return Err(StoreError::Unavailable(format!("list {} rejected", bucket)));
        }
        let objects = state
            .buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        let max_keys = request.max_keys.unwrap_or(self.max_keys).max(1);

        let mut remaining = objects
            .iter()
            .filter(|(key, _)| {
                request
                    .prefix
                    .as_deref()
                    .map_or(true, |prefix| key.starts_with(prefix))
                    && request
                        .continuation_token
                        .as_deref()
                        .map_or(true, |after| key.as_str() > after)
            })
            .map(|(key, object)| ObjectSummary {
                key: key.clone(),
                size: object.body.len() as u64,
                last_modified: object.last_modified,
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
        validate_bucket(bucket)?;
        validate_key(key)?;
        if self
            .lock()
            .failing_puts
            .contains(&(bucket.to_string(), key.to_string()))
        {
            return Err(injected("put", bucket, key));
        }

        let mut content = Vec::new();
        body.read_to_end(&mut content).await?;

        let mut state = self.lock();
        if !state.buckets.contains_key(bucket) {
            return Err(StoreError::NoSuchBucket(bucket.to_string()));
        }
        let version_id = self.allocate_version(&mut state);
        if let Some(objects) = state.buckets.get_mut(bucket) {
            objects.insert(
                key.to_string(),
                StoredObject {
                    body: content,
                    tags: Vec::new(),
                    version_id: version_id.clone(),
                    last_modified: Utc::now(),
                },
            );
        }
        Ok(version_id)
    }

    async fn put_object_tagging(
        &self,
        bucket: &str,
        key: &str,
        tags: Vec<Tag>,
    ) -> Result<Option<String>, StoreError> {
        let mut state = self.lock();
        let rejected = state.failing_tagging.iter().any(|(b, k, value)| {
            b == bucket
                && k == key
                && value
                    .as_deref()
                    .map_or(true, |value| tags.iter().any(|tag| tag.value == value))
        });
        if rejected {
            return Err(injected("tag", bucket, key));
        }

        let object = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?
            .get_mut(key)
            .ok_or_else(|| StoreError::not_found(bucket, key))?;
        object.tags = tags.clone();
        let version_id = object.version_id.clone();

        state.tag_history.push(TagWrite {
            bucket: bucket.to_string(),
            key: key.to_string(),
            tags,
        });
        Ok(version_id)
    }

    async fn get_object_tagging(&self, bucket: &str, key: &str) -> Result<Vec<Tag>, StoreError> {
        self.object_tags(bucket, key).ok_or_else(|| {
            if self.lock().buckets.contains_key(bucket) {
                StoreError::not_found(bucket, key)
            } else {
                StoreError::NoSuchBucket(bucket.to_string())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tag_history_records_successful_writes_only() {
        let store = MemoryObjectStore::new().versioned(true);
        store.insert_object("b", "k", b"x".to_vec());
        store.fail_tagging_for("b", "k", Some("ERROR"));

        let version = store
            .put_object_tagging("b", "k", vec![Tag::new("scan-status", "CLEAN")])
            .await
            .unwrap();
        assert_eq!(version.as_deref(), Some("v1"));

        let rejected = store
            .put_object_tagging("b", "k", vec![Tag::new("scan-status", "ERROR")])
            .await;
        assert!(matches!(rejected, Err(StoreError::Unavailable(_))));

        let history = store.tag_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].tags, vec![Tag::new("scan-status", "CLEAN")]);
    }

    #[tokio::test]
    async fn test_put_requires_existing_bucket() {
        let store = MemoryObjectStore::new();
        let result = store.put_object("missing", "k", Box::new(&b"x"[..])).await;
        assert!(matches!(result, Err(StoreError::NoSuchBucket(_))));

        store.create_bucket("present");
        store
            .put_object("present", "k", Box::new(&b"x"[..]))
            .await
            .unwrap();
        assert_eq!(store.object_body("present", "k"), Some(b"x".to_vec()));
    }
}
