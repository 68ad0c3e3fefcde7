//! `bucketguard definitions`: signature database sync and refresh

use super::output::print_json;
use super::Outcome;
use anyhow::{Context, Result};
use bucketguard_av::{AntivirusConfig, ScanOrchestrator};
use clap::Subcommand;
use serde::Serialize;

#[derive(Subcommand, Debug)]
pub enum DefinitionsAction {
    /// Upload local definition files to a bucket
    Upload {
        #[arg(long)]
        bucket: String,

        #[arg(long)]
        json: bool,
    },

    /// Download definition files from a bucket into the definitions directory
    Download {
        #[arg(long)]
        bucket: String,

        #[arg(long)]
        json: bool,
    },

    /// Run freshclam against the local definitions directory
    Update {
        /// freshclam.conf line, written only if the config does not exist yet
        /// (repeatable; default: the configured `freshclam_config`)
        #[arg(long = "config-line")]
        config_line: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// Download, update with freshclam, then upload the result
    Refresh {
        #[arg(long)]
        bucket: String,

        #[arg(long = "config-line")]
        config_line: Vec<String>,

        #[arg(long)]
        json: bool,
    },
}

impl DefinitionsAction {
    pub fn wants_json(&self) -> bool {
        match self {
            DefinitionsAction::Upload { json, .. }
            | DefinitionsAction::Download { json, .. }
            | DefinitionsAction::Update { json, .. }
            | DefinitionsAction::Refresh { json, .. } => *json,
        }
    }
}

#[derive(Debug, Serialize)]
struct SyncReport<'a> {
    operation: &'a str,
    bucket: Option<&'a str>,
    files: &'a [String],
}

pub async fn run(
    scanner: &ScanOrchestrator,
    config: &AntivirusConfig,
    action: DefinitionsAction,
) -> Result<Outcome> {
    match action {
        DefinitionsAction::Upload { bucket, json } => {
            let files = scanner
                .upload_definitions(&bucket)
                .await
                .with_context(|| format!("Failed to upload definitions to {}", bucket))?;
            report("upload", Some(&bucket), &files, json)?;
        }
        DefinitionsAction::Download { bucket, json } => {
            let files = scanner
                .download_definitions(&bucket)
                .await
                .with_context(|| format!("Failed to download definitions from {}", bucket))?;
            report("download", Some(&bucket), &files, json)?;
        }
        DefinitionsAction::Update { config_line, json } => {
            let lines = config_lines(config, config_line);
            scanner
                .update_definitions(&lines)
                .await
                .context("Failed to update definitions")?;
            report("update", None, &[], json)?;
        }
        DefinitionsAction::Refresh {
            bucket,
            config_line,
            json,
        } => {
            let lines = config_lines(config, config_line);
            let files = scanner
                .refresh_definitions(&bucket, &lines)
                .await
                .with_context(|| format!("Failed to refresh definitions in {}", bucket))?;
            report("refresh", Some(&bucket), &files, json)?;
        }
    }

    Ok(Outcome::Success)
}

fn config_lines(config: &AntivirusConfig, from_flags: Vec<String>) -> Vec<String> {
    if from_flags.is_empty() {
        config.freshclam_config.clone()
    } else {
        from_flags
    }
}

fn report(operation: &str, bucket: Option<&str>, files: &[String], json: bool) -> Result<()> {
    if json {
        return print_json(&SyncReport {
            operation,
            bucket,
            files,
        });
    }

    match bucket {
        Some(bucket) => println!("{}: {} definition file(s) in {}", operation, files.len(), bucket),
        None => println!("{}: definitions up to date", operation),
    }
    for file in files {
        println!("  {}", file);
    }
    Ok(())
}
