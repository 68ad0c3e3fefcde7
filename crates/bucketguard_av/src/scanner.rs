//! Per-object scan pipeline.
//!
//! ```text
//! STARTED -> IN PROGRESS tag -> staged -> scanned -> CLEAN | INFECTED | ERROR
//! ```
//!
//! A failed `IN PROGRESS` tag aborts before anything is staged. A staging
//! failure leaves the object tagged `IN PROGRESS`. An engine failure tags the
//! object `ERROR` before the error is returned. The scratch file is removed on
//! every path out of [`ScanOrchestrator::scan`].

use crate::config::AntivirusConfig;
use crate::definitions::DefinitionStore;
use crate::engine::ScanEngine;
use crate::error::{DefinitionError, ScanError};
use crate::runner::{CommandRunner, ProcessRunner};
use crate::stager::{ObjectStager, ScratchFile};
use crate::status::{ScanResult, ScanStatus};
use crate::store::{LocalObjectStore, ObjectStore};
use crate::tagger::ScanStatusTagger;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Store used when the caller does not inject one.
pub fn default_store(config: &AntivirusConfig) -> Arc<dyn ObjectStore> {
    Arc::new(LocalObjectStore::new(&config.store_root).versioned(config.versioned_store))
}

/// Entry point of the pipeline. Cheap to clone; clones share collaborators.
#[derive(Clone)]
pub struct ScanOrchestrator {
    tagger: ScanStatusTagger,
    stager: ObjectStager,
    engine: ScanEngine,
    definitions: DefinitionStore,
}

impl ScanOrchestrator {
    /// Build the pipeline, running clamscan and freshclam as real subprocesses.
    pub fn new(config: &AntivirusConfig, store: Option<Arc<dyn ObjectStore>>) -> Self {
        Self::with_runner(config, store, Arc::new(ProcessRunner))
    }

    pub fn with_runner(
        config: &AntivirusConfig,
        store: Option<Arc<dyn ObjectStore>>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let store = store.unwrap_or_else(|| default_store(config));
        Self {
            tagger: ScanStatusTagger::new(Arc::clone(&store), &config.scan_status_tag_name),
            stager: ObjectStager::new(Arc::clone(&store)),
            engine: ScanEngine::new(
                Arc::clone(&runner),
                &config.clamscan_path,
                &config.definitions_dir,
            ),
            definitions: DefinitionStore::new(
                store,
                runner,
                &config.definitions_dir,
                &config.freshclam_path,
                &config.freshclam_config_path,
            ),
        }
    }

    pub fn tagger(&self) -> &ScanStatusTagger {
        &self.tagger
    }

    pub fn definitions(&self) -> &DefinitionStore {
        &self.definitions
    }

    pub async fn upload_definitions(&self, bucket: &str) -> Result<Vec<String>, DefinitionError> {
        self.definitions.upload_definitions(bucket).await
    }

    pub async fn download_definitions(&self, bucket: &str) -> Result<Vec<String>, DefinitionError> {
        self.definitions.download_definitions(bucket).await
    }

    pub async fn update_definitions(&self, config_lines: &[String]) -> Result<(), DefinitionError> {
        self.definitions.update_definitions(config_lines).await
    }

    /// Pull the shared database, run freshclam over it, push the result back.
    pub async fn refresh_definitions(
        &self,
        bucket: &str,
        config_lines: &[String],
    ) -> Result<Vec<String>, DefinitionError> {
        self.download_definitions(bucket).await?;
        self.update_definitions(config_lines).await?;
        self.upload_definitions(bucket).await
    }

    /// Scan one object, using `scan_path` as its scratch file.
    ///
    /// `scan_path` must not be shared with another in-flight scan. It is
    /// deleted before this returns, whatever the outcome.
    pub async fn scan(
        &self,
        bucket: &str,
        key: &str,
        scan_path: &Path,
    ) -> Result<ScanResult, ScanError> {
        info!(bucket, key, "Scanning object");
        self.tag(bucket, key, ScanStatus::InProgress).await?;

        let scratch = ScratchFile::claim(scan_path);
        let outcome = self.stage_and_scan(bucket, key, scratch.path()).await;

        match (outcome, scratch.release().await) {
            (Ok(result), Ok(())) => Ok(result),
            (Ok(_), Err(source)) => Err(ScanError::Cleanup {
                path: scan_path.to_path_buf(),
                source,
            }),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup)) => {
                warn!(path = %scan_path.display(), "Failed to remove scratch file: {}", cleanup);
                Err(err)
            }
        }
    }

    async fn stage_and_scan(
        &self,
        bucket: &str,
        key: &str,
        scan_path: &Path,
    ) -> Result<ScanResult, ScanError> {
        let bytes = self
            .stager
            .stage(bucket, key, scan_path)
            .await
            .map_err(|source| ScanError::Staging {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            })?;
        debug!(bucket, key, bytes, "Running scan engine");

        match self.engine.run(scan_path).await {
            Ok(verdict) => {
                self.tag(bucket, key, verdict.status).await?;
                info!(bucket, key, status = %verdict.status, "Scan complete");
                Ok(ScanResult {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    status: verdict.status,
                    message: verdict.message,
                })
            }
            Err(engine) => {
                error!(bucket, key, "Scan engine failed: {}", engine);
                match self.tagger.set_status(bucket, key, ScanStatus::Error).await {
                    Ok(_) => Err(ScanError::Engine(engine)),
                    Err(tagging) => Err(ScanError::ErrorTagFailed { engine, tagging }),
                }
            }
        }
    }

    async fn tag(&self, bucket: &str, key: &str, status: ScanStatus) -> Result<(), ScanError> {
        self.tagger
            .set_status(bucket, key, status)
            .await
            .map(|_| ())
            .map_err(|source| ScanError::Tagging {
                bucket: bucket.to_string(),
                key: key.to_string(),
                status,
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandOutput;
    use crate::store::{MemoryObjectStore, Tag};
    use async_trait::async_trait;
    use std::io;
    use std::path::PathBuf;

    struct ExitRunner(Option<i32>);

    #[async_trait]
    impl CommandRunner for ExitRunner {
        async fn run(&self, _program: &Path, _args: &[String]) -> io::Result<CommandOutput> {
            Ok(CommandOutput {
                exit_code: self.0,
                stdout: "report".to_string(),
                stderr: String::new(),
            })
        }
    }

    fn orchestrator(store: &MemoryObjectStore, exit_code: Option<i32>) -> ScanOrchestrator {
        ScanOrchestrator::with_runner(
            &AntivirusConfig::default(),
            Some(Arc::new(store.clone())),
            Arc::new(ExitRunner(exit_code)),
        )
    }

    #[tokio::test]
    async fn test_in_progress_tag_failure_aborts_before_staging() {
        let store = MemoryObjectStore::new();
        store.insert_object("b", "k", b"x".to_vec());
        store.fail_tagging_for("b", "k", Some("IN PROGRESS"));

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("scan");
        let err = orchestrator(&store, Some(0))
            .scan("b", "k", &path)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ScanError::Tagging {
                status: ScanStatus::InProgress,
                ..
            }
        ));
        assert!(store.tag_history().is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_verdict_tag_failure_still_cleans_up() {
        let store = MemoryObjectStore::new();
        store.insert_object("b", "k", b"x".to_vec());
        store.fail_tagging_for("b", "k", Some("CLEAN"));

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("scan");
        let err = orchestrator(&store, Some(0))
            .scan("b", "k", &path)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ScanError::Tagging {
                status: ScanStatus::Clean,
                ..
            }
        ));
        assert_eq!(
            store.object_tags("b", "k").unwrap(),
            vec![Tag::new("scan-status", "IN PROGRESS")]
        );
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_error_tag_failure_keeps_both_causes() {
        let store = MemoryObjectStore::new();
        store.insert_object("b", "k", b"x".to_vec());
        store.fail_tagging_for("b", "k", Some("ERROR"));

        let tmp = tempfile::tempdir().unwrap();
        let err = orchestrator(&store, Some(2))
            .scan("b", "k", &tmp.path().join("scan"))
            .await
            .unwrap_err();

        match err {
            ScanError::ErrorTagFailed { engine, tagging } => {
                assert_eq!(engine.exit_code(), Some(2));
                assert!(tagging.to_string().contains("b/k"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_uses_configured_tag_name() {
        let store = MemoryObjectStore::new();
        store.insert_object("b", "k", b"x".to_vec());
        let config = AntivirusConfig {
            scan_status_tag_name: "av".to_string(),
            ..AntivirusConfig::default()
        };
        let scanner = ScanOrchestrator::with_runner(
            &config,
            Some(Arc::new(store.clone())),
            Arc::new(ExitRunner(Some(1))),
        );

        let tmp = tempfile::tempdir().unwrap();
        scanner.scan("b", "k", &tmp.path().join("scan")).await.unwrap();

        assert_eq!(store.object_tags("b", "k").unwrap(), vec![Tag::new("av", "INFECTED")]);
        assert_eq!(scanner.tagger().tag_name(), "av");
    }

    #[test]
    fn test_new_falls_back_to_default_store() {
        let config = AntivirusConfig {
            store_root: PathBuf::from("/srv/objects"),
            ..AntivirusConfig::default()
        };
        let scanner = ScanOrchestrator::new(&config, None);
        assert_eq!(scanner.definitions().definitions_dir(), Path::new("/tmp/clamav"));
    }
}
