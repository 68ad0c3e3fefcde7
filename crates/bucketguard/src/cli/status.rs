//! `bucketguard status`: show the scan status tag of an object

use super::output::{print_json, print_table, status_cell};
use super::Outcome;
use anyhow::{Context, Result};
use bucketguard_av::{ScanOrchestrator, ScanStatus};
use comfy_table::Cell;
use serde::Serialize;

#[derive(Debug)]
pub struct StatusArgs {
    pub bucket: String,
    pub key: String,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport<'a> {
    bucket: &'a str,
    key: &'a str,
    tag: &'a str,
    status: Option<ScanStatus>,
}

pub async fn run(scanner: &ScanOrchestrator, args: StatusArgs) -> Result<Outcome> {
    let tagger = scanner.tagger();
    let status = tagger
        .get_status(&args.bucket, &args.key)
        .await
        .with_context(|| format!("Failed to read scan status of {}/{}", args.bucket, args.key))?;

    if args.json {
        print_json(&StatusReport {
            bucket: &args.bucket,
            key: &args.key,
            tag: tagger.tag_name(),
            status,
        })?;
    } else {
        print_table(
            &["BUCKET", "KEY", "STATUS"],
            vec![vec![
                Cell::new(&args.bucket),
                Cell::new(&args.key),
                status_cell(status),
            ]],
        );
    }

    Ok(Outcome::Success)
}
