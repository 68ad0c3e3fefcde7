//! `bucketguard scan`: scan one object and tag it with the verdict

use super::output::print_json;
use super::Outcome;
use anyhow::{Context, Result};
use bucketguard_av::{AntivirusConfig, ScanOrchestrator, ScanResult, ScanStatus};
use std::path::PathBuf;
use uuid::Uuid;

/// Arguments for the scan command
#[derive(Debug)]
pub struct ScanArgs {
    pub bucket: String,
    pub key: String,
    pub scratch: Option<PathBuf>,
    pub json: bool,
}

pub async fn run(
    scanner: &ScanOrchestrator,
    config: &AntivirusConfig,
    args: ScanArgs,
) -> Result<Outcome> {
    let scan_path = match args.scratch {
        Some(path) => path,
        None => scratch_path(config).await?,
    };

    let result = scanner
        .scan(&args.bucket, &args.key, &scan_path)
        .await
        .with_context(|| format!("Scan of {}/{} failed", args.bucket, args.key))?;

    if args.json {
        print_json(&result)?;
    } else {
        print_result(&result);
    }

    Ok(match result.status {
        ScanStatus::Infected => Outcome::Infected,
        _ => Outcome::Success,
    })
}

/// Fresh scratch file under the configured scratch directory.
async fn scratch_path(config: &AntivirusConfig) -> Result<PathBuf> {
    tokio::fs::create_dir_all(&config.scratch_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create scratch directory {}",
                config.scratch_dir.display()
            )
        })?;
    Ok(config.scratch_dir.join(Uuid::new_v4().to_string()))
}

fn print_result(result: &ScanResult) {
    println!("{}/{}: {}", result.bucket, result.key, result.status);
    if !result.message.is_empty() {
        println!();
        println!("{}", result.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketguard_av::{CommandOutput, CommandRunner, MemoryObjectStore};
    use std::io;
    use std::path::Path;
    use std::sync::Arc;

    struct ExitRunner(i32);

    #[async_trait::async_trait]
    impl CommandRunner for ExitRunner {
        async fn run(&self, _program: &Path, _args: &[String]) -> io::Result<CommandOutput> {
            Ok(CommandOutput {
                exit_code: Some(self.0),
                stdout: "report".to_string(),
                stderr: String::new(),
            })
        }
    }

    fn setup(exit_code: i32) -> (ScanOrchestrator, AntivirusConfig, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let config = AntivirusConfig {
            scratch_dir: tmp.path().join("scratch"),
            ..AntivirusConfig::default()
        };
        let store = MemoryObjectStore::new();
        store.insert_object("b", "k", b"data".to_vec());
        let scanner =
            ScanOrchestrator::with_runner(&config, Some(Arc::new(store)), Arc::new(ExitRunner(exit_code)));
        (scanner, config, tmp)
    }

    fn args() -> ScanArgs {
        ScanArgs {
            bucket: "b".to_string(),
            key: "k".to_string(),
            scratch: None,
            json: true,
        }
    }

    #[tokio::test]
    async fn test_infected_maps_to_infected_outcome() {
        let (scanner, config, _tmp) = setup(1);
        assert_eq!(run(&scanner, &config, args()).await.unwrap(), Outcome::Infected);
    }

    #[tokio::test]
    async fn test_clean_maps_to_success_and_leaves_scratch_dir_empty() {
        let (scanner, config, _tmp) = setup(0);
        assert_eq!(run(&scanner, &config, args()).await.unwrap(), Outcome::Success);
        assert_eq!(std::fs::read_dir(&config.scratch_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_engine_failure_is_an_error() {
        let (scanner, config, _tmp) = setup(2);
        let err = run(&scanner, &config, args()).await.unwrap_err();
        assert!(err.to_string().contains("b/k"));
        assert!(err.downcast_ref::<bucketguard_av::ScanError>().is_some());
    }
}
