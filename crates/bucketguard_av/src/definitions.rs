//! Signature database mirroring and refresh.
//!
//! The bucket holds the authoritative copy of the ClamAV database; the local
//! definitions directory is a cache rebuilt from it. Only files named like
//! `main.cvd` or `daily.cld` take part in either direction.

use crate::error::{DefinitionError, ProcessError, StageError};
use crate::runner::CommandRunner;
use crate::stager::{ObjectStager, ScratchFile};
use crate::store::{list_all_objects, ObjectStore};
use futures::future::try_join_all;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};
use uuid::Uuid;

// Word characters, then `.cvd` or `.cld`, nothing else.
static DEFINITION_FILE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w+\.c[vl]d$").expect("definition file pattern is valid")
});

/// Whether `name` is a signature database file.
pub fn is_definition_file(name: &str) -> bool {
    DEFINITION_FILE_PATTERN.is_match(name)
}

#[derive(Clone)]
pub struct DefinitionStore {
    store: Arc<dyn ObjectStore>,
    stager: ObjectStager,
    runner: Arc<dyn CommandRunner>,
    definitions_dir: PathBuf,
    freshclam_path: PathBuf,
    freshclam_config_path: PathBuf,
}

impl DefinitionStore {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        runner: Arc<dyn CommandRunner>,
        definitions_dir: impl Into<PathBuf>,
        freshclam_path: impl Into<PathBuf>,
        freshclam_config_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            stager: ObjectStager::new(Arc::clone(&store)),
            store,
            runner,
            definitions_dir: definitions_dir.into(),
            freshclam_path: freshclam_path.into(),
            freshclam_config_path: freshclam_config_path.into(),
        }
    }

    pub fn definitions_dir(&self) -> &Path {
        &self.definitions_dir
    }

    /// Upload every local definition file to `bucket` under its file name.
    ///
    /// Uploads run concurrently. The first failure fails the call; files that
    /// were already uploaded stay in the bucket. Returns the uploaded keys.
    pub async fn upload_definitions(&self, bucket: &str) -> Result<Vec<String>, DefinitionError> {
        let files = self.local_definition_files().await?;
        debug!(bucket, ?files, "Uploading definitions");

        try_join_all(files.iter().map(|name| async move {
            self.stager
                .publish(bucket, name, &self.definitions_dir.join(name))
                .await
                .map_err(|source| DefinitionError::Upload {
                    file: name.clone(),
                    source,
                })
        }))
        .await?;

        info!(bucket, count = files.len(), "Definitions uploaded");
        Ok(files)
    }

    /// Download every definition file in `bucket` into the definitions directory.
    ///
    /// The listing follows continuation tokens until the bucket is exhausted.
    /// Same failure semantics as [`DefinitionStore::upload_definitions`]. A
    /// local file is only ever replaced by a completely transferred copy.
    pub async fn download_definitions(&self, bucket: &str) -> Result<Vec<String>, DefinitionError> {
        let objects = list_all_objects(self.store.as_ref(), bucket, None)
            .await
            .map_err(|source| DefinitionError::List {
                bucket: bucket.to_string(),
                source,
            })?;
        let keys: Vec<String> = objects
            .into_iter()
            .map(|object| object.key)
            .filter(|key| is_definition_file(key))
            .collect();

        tokio::fs::create_dir_all(&self.definitions_dir)
            .await
            .map_err(|source| DefinitionError::ReadDir {
                path: self.definitions_dir.clone(),
                source,
            })?;

        debug!(bucket, ?keys, "Downloading definitions");
        try_join_all(keys.iter().map(|key| self.download_one(bucket, key))).await?;

        info!(bucket, count = keys.len(), "Definitions downloaded");
        Ok(keys)
    }

    /// Stage `key` next to its target under a hidden name, then rename it into place.
    async fn download_one(&self, bucket: &str, key: &str) -> Result<(), DefinitionError> {
        let target = self.definitions_dir.join(key);
        let partial = ScratchFile::claim(
            self.definitions_dir
                .join(format!(".{}.{}.part", key, Uuid::new_v4())),
        );
        let download_error = |source| DefinitionError::Download {
            key: key.to_string(),
            source,
        };

        self.stager
            .stage(bucket, key, partial.path())
            .await
            .map_err(download_error)?;
        tokio::fs::rename(partial.path(), &target)
            .await
            .map_err(|source| {
                download_error(StageError::CreateLocal {
                    path: target.clone(),
                    source,
                })
            })?;

        // Nothing is left at the partial path after the rename.
        if let Err(err) = partial.release().await {
            debug!(key, "Failed to release partial download: {}", err);
        }
        Ok(())
    }

    /// Refresh the local database with freshclam.
    ///
    /// The freshclam config is written from `config_lines` only when the file
    /// does not exist yet; an existing config is left untouched.
    pub async fn update_definitions(&self, config_lines: &[String]) -> Result<(), DefinitionError> {
        self.ensure_freshclam_config(config_lines).await?;

        let user = os_user().ok_or(DefinitionError::UnknownUser)?;
        let args = self.freshclam_args(&user);
        debug!(program = %self.freshclam_path.display(), ?args, "Running freshclam");

        let output = self
            .runner
            .run(&self.freshclam_path, &args)
            .await
            .map_err(|source| {
                DefinitionError::Update(ProcessError::Launch {
                    program: self.freshclam_path.clone(),
                    source,
                })
            })?;

        if !output.success() {
            return Err(DefinitionError::Update(ProcessError::Exit {
                program: self.freshclam_path.clone(),
                code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            }));
        }

        info!(dir = %self.definitions_dir.display(), "Definitions updated");
        Ok(())
    }

    /// `--config-file=<path> --stdout -u <user> --datadir=<definitions dir>`
    pub fn freshclam_args(&self, user: &str) -> Vec<String> {
        vec![
            format!("--config-file={}", self.freshclam_config_path.display()),
            "--stdout".to_string(),
            "-u".to_string(),
            user.to_string(),
            format!("--datadir={}", self.definitions_dir.display()),
        ]
    }

    async fn ensure_freshclam_config(&self, config_lines: &[String]) -> Result<(), DefinitionError> {
        let path = &self.freshclam_config_path;
        if tokio::fs::metadata(path).await.is_ok() {
            return Ok(());
        }

        let write = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, config_lines.join("\n")).await
        };
        write.await.map_err(|source| DefinitionError::WriteConfig {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "Wrote freshclam config");
        Ok(())
    }

    /// Sorted names of the regular files in the definitions directory that match the pattern.
    async fn local_definition_files(&self) -> Result<Vec<String>, DefinitionError> {
        let read_dir_error = |source| DefinitionError::ReadDir {
            path: self.definitions_dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.definitions_dir)
            .await
            .map_err(read_dir_error)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_dir_error)? {
            if !entry.file_type().await.map_err(read_dir_error)?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_definition_file(&name) {
                files.push(name);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Name of the user running this process, as passed to `freshclam -u`.
///
/// The passwd entry of the effective uid wins; `$USER` and then `$USERNAME`
/// are consulted when there is none (or on non-unix targets).
pub fn os_user() -> Option<String> {
    resolve_user(effective_user_name(), |name| std::env::var(name).ok())
}

fn resolve_user(
    passwd_name: Option<String>,
    env: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    passwd_name
        .into_iter()
        .chain(env("USER"))
        .chain(env("USERNAME"))
        .find(|name| !name.trim().is_empty())
}

#[cfg(unix)]
fn effective_user_name() -> Option<String> {
    use nix::unistd::{geteuid, User};

    match User::from_uid(geteuid()) {
        Ok(user) => user.map(|user| user.name),
        Err(err) => {
            debug!("passwd lookup for effective uid failed: {}", err);
            None
        }
    }
}

#[cfg(not(unix))]
fn effective_user_name() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_file_pattern() {
        assert!(is_definition_file("main.cvd"));
        assert!(is_definition_file("daily.cld"));
        assert!(is_definition_file("bytecode.cvd"));
        assert!(is_definition_file("safe_browsing.cvd"));

        assert!(!is_definition_file("README.txt"));
        assert!(!is_definition_file("notes.txt"));
        assert!(!is_definition_file("freshclam.dat"));
        assert!(!is_definition_file("main.CVD"));
        assert!(!is_definition_file(".cvd"));
        assert!(!is_definition_file("main.cvd.tmp"));
        assert!(!is_definition_file("mainxcvd"));
        assert!(!is_definition_file("nested/main.cvd"));
    }

    fn env_of(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn test_passwd_name_wins_over_env() {
        let user = resolve_user(Some("clamav".to_string()), env_of(&[("USER", "root")]));
        assert_eq!(user.as_deref(), Some("clamav"));
    }

    #[test]
    fn test_env_fallback_order() {
        assert_eq!(
            resolve_user(None, env_of(&[("USER", "alice"), ("USERNAME", "bob")])).as_deref(),
            Some("alice")
        );
        assert_eq!(
            resolve_user(None, env_of(&[("USERNAME", "bob")])).as_deref(),
            Some("bob")
        );
        assert_eq!(
            resolve_user(None, env_of(&[("USER", ""), ("USERNAME", "bob")])).as_deref(),
            Some("bob")
        );
    }

    #[test]
    fn test_no_user_when_nothing_resolves() {
        assert_eq!(resolve_user(None, env_of(&[])), None);
        assert_eq!(resolve_user(Some(String::new()), env_of(&[("USER", " ")])), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_passwd_entry_is_preferred_by_os_user() {
        // Containers may run under a uid without a passwd entry.
        if let Some(name) = effective_user_name() {
            assert_eq!(os_user(), Some(name));
        }
    }
}
