//! Scan status tag on stored objects.

use crate::error::StoreError;
use crate::status::ScanStatus;
use crate::store::{ObjectStore, Tag};
use std::sync::Arc;
use tracing::{debug, warn};

/// Reads and writes the single scan status tag of an object.
#[derive(Clone)]
pub struct ScanStatusTagger {
    store: Arc<dyn ObjectStore>,
    tag_name: String,
}

impl ScanStatusTagger {
    pub fn new(store: Arc<dyn ObjectStore>, tag_name: impl Into<String>) -> Self {
        Self {
            store,
            tag_name: tag_name.into(),
        }
    }

    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    /// Replace the object's tag set with exactly `{tag_name: status}`.
    ///
    /// Other tags the object carried are not preserved. Returns the version id
    /// of the tagged object when the store is versioned.
    pub async fn set_status(
        &self,
        bucket: &str,
        key: &str,
        status: ScanStatus,
    ) -> Result<Option<String>, StoreError> {
        let version_id = self
            .store
            .put_object_tagging(bucket, key, vec![Tag::new(&self.tag_name, status.as_str())])
            .await?;
        debug!(bucket, key, %status, ?version_id, "Scan status tagged");
        Ok(version_id)
    }

    /// Current scan status, `None` if the object was never tagged.
    pub async fn get_status(&self, bucket: &str, key: &str) -> Result<Option<ScanStatus>, StoreError> {
        let tags = self.store.get_object_tagging(bucket, key).await?;
        let Some(tag) = tags.into_iter().find(|tag| tag.key == self.tag_name) else {
            return Ok(None);
        };
        match tag.value.parse() {
            Ok(status) => Ok(Some(status)),
            Err(err) => {
                warn!(bucket, key, "Ignoring unrecognized scan status tag: {}", err);
                Ok(None)
            }
        }
    }
}
