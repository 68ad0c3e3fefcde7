//! Error reporting for `--json` mode

use bucketguard_av::{ScanError, ScanStatus};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct JsonError {
    pub error: String,
    /// Full cause chain, outermost first
    pub causes: Vec<String>,
    /// Status the object was left with, for scan failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ScanStatus>,
}

impl JsonError {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self {
            error: err.to_string(),
            causes: err.chain().skip(1).map(|cause| cause.to_string()).collect(),
            status: err
                .downcast_ref::<ScanError>()
                .and_then(ScanError::status_left_on_object),
        }
    }
}

/// Print the error as a JSON object on stdout.
pub fn print_json_error(err: &anyhow::Error) {
    match serde_json::to_string_pretty(&JsonError::from_anyhow(err)) {
        Ok(json) => println!("{}", json),
        Err(_) => eprintln!("{:?}", err),
    }
}
