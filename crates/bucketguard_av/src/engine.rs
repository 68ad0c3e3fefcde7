//! clamscan invocation and exit code interpretation.
//!
//! | exit code | verdict |
//! |-----------|---------|
//! | 0         | `CLEAN`, message = stdout |
//! | 1         | `INFECTED`, message = stdout |
//! | other, signal, launch failure | [`ProcessError`] |

use crate::defaults::{CLEAN_EXIT_CODE, INFECTED_EXIT_CODE};
use crate::error::ProcessError;
use crate::runner::CommandRunner;
use crate::status::ScanStatus;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Verdict of a scan that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVerdict {
    /// Either `Clean` or `Infected`
    pub status: ScanStatus,
    pub message: String,
}

#[derive(Clone)]
pub struct ScanEngine {
    runner: Arc<dyn CommandRunner>,
    clamscan_path: PathBuf,
    definitions_dir: PathBuf,
}

impl ScanEngine {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        clamscan_path: impl Into<PathBuf>,
        definitions_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            clamscan_path: clamscan_path.into(),
            definitions_dir: definitions_dir.into(),
        }
    }

    /// `-v --stdout --database=<definitions dir> -r <scan path>`
    pub fn scan_args(&self, scan_path: &Path) -> Vec<String> {
        vec![
            "-v".to_string(),
            "--stdout".to_string(),
            format!("--database={}", self.definitions_dir.display()),
            "-r".to_string(),
            scan_path.display().to_string(),
        ]
    }

    pub async fn run(&self, scan_path: &Path) -> Result<EngineVerdict, ProcessError> {
        let args = self.scan_args(scan_path);
        debug!(program = %self.clamscan_path.display(), ?args, "Running scan engine");

        let output = self
            .runner
            .run(&self.clamscan_path, &args)
            .await
            .map_err(|source| ProcessError::Launch {
                program: self.clamscan_path.clone(),
                source,
            })?;

        let status = match output.exit_code {
            Some(CLEAN_EXIT_CODE) => ScanStatus::Clean,
            Some(INFECTED_EXIT_CODE) => ScanStatus::Infected,
            code => {
                return Err(ProcessError::Exit {
                    program: self.clamscan_path.clone(),
                    code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                })
            }
        };

        Ok(EngineVerdict {
            status,
            message: output.stdout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandOutput;
    use async_trait::async_trait;
    use std::io;
    use std::sync::Mutex;

    struct FixedRunner {
        exit_code: Option<i32>,
        stdout: &'static str,
        calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
    }

    impl FixedRunner {
        fn new(exit_code: Option<i32>, stdout: &'static str) -> Arc<Self> {
            Arc::new(Self {
                exit_code,
                stdout,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandRunner for FixedRunner {
        async fn run(&self, program: &Path, args: &[String]) -> io::Result<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_path_buf(), args.to_vec()));
            Ok(CommandOutput {
                exit_code: self.exit_code,
                stdout: self.stdout.to_string(),
                stderr: "LibClamAV Error".to_string(),
            })
        }
    }

    struct UnlaunchableRunner;

    #[async_trait]
    impl CommandRunner for UnlaunchableRunner {
        async fn run(&self, _program: &Path, _args: &[String]) -> io::Result<CommandOutput> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such file"))
        }
    }

    fn engine(runner: Arc<dyn CommandRunner>) -> ScanEngine {
        ScanEngine::new(runner, "/opt/clamav/clamscan", "/tmp/clamav")
    }

    #[tokio::test]
    async fn test_exit_zero_is_clean_with_stdout() {
        let runner = FixedRunner::new(Some(0), "OK");
        let verdict = engine(runner.clone()).run(Path::new("/tmp/scan/1")).await.unwrap();

        assert_eq!(verdict.status, ScanStatus::Clean);
        assert_eq!(verdict.message, "OK");

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].0, PathBuf::from("/opt/clamav/clamscan"));
        assert_eq!(
            calls[0].1,
            vec!["-v", "--stdout", "--database=/tmp/clamav", "-r", "/tmp/scan/1"]
        );
    }

    #[tokio::test]
    async fn test_exit_one_is_infected() {
        let runner = FixedRunner::new(Some(1), "Win.Test.EICAR FOUND");
        let verdict = engine(runner).run(Path::new("/tmp/scan/1")).await.unwrap();

        assert_eq!(verdict.status, ScanStatus::Infected);
        assert_eq!(verdict.message, "Win.Test.EICAR FOUND");
    }

    #[tokio::test]
    async fn test_other_exit_codes_are_errors() {
        let err = engine(FixedRunner::new(Some(2), ""))
            .run(Path::new("/tmp/scan/1"))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(2));
        assert!(err.to_string().contains("LibClamAV Error"));

        let err = engine(FixedRunner::new(None, ""))
            .run(Path::new("/tmp/scan/1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Exit { code: None, .. }));
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let err = engine(Arc::new(UnlaunchableRunner))
            .run(Path::new("/tmp/scan/1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Launch { .. }));
    }
}
