//! Scan status values and the per-scan result.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Status written to the scan status tag of an object.
///
/// A scan always starts at `InProgress` and ends in exactly one of the
/// terminal states. Nothing is remembered between scans: a rescan starts
/// over at `InProgress` and overwrites the previous verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanStatus {
    #[serde(rename = "IN PROGRESS")]
    InProgress,
    #[serde(rename = "CLEAN")]
    Clean,
    #[serde(rename = "INFECTED")]
    Infected,
    #[serde(rename = "ERROR")]
    Error,
}

impl ScanStatus {
    /// Tag value stored on the object.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::InProgress => "IN PROGRESS",
            ScanStatus::Clean => "CLEAN",
            ScanStatus::Infected => "INFECTED",
            ScanStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown scan status: {0:?}")]
pub struct UnknownScanStatus(pub String);

impl FromStr for ScanStatus {
    type Err = UnknownScanStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN PROGRESS" => Ok(ScanStatus::InProgress),
            "CLEAN" => Ok(ScanStatus::Clean),
            "INFECTED" => Ok(ScanStatus::Infected),
            "ERROR" => Ok(ScanStatus::Error),
            other => Err(UnknownScanStatus(other.to_string())),
        }
    }
}

/// Outcome of one completed scan.
///
/// `message` carries the engine's stdout: the clean report or the infection
/// description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub bucket: String,
    pub key: String,
    pub status: ScanStatus,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_literals() {
        assert_eq!(ScanStatus::InProgress.to_string(), "IN PROGRESS");
        assert_eq!(ScanStatus::Clean.to_string(), "CLEAN");
        assert_eq!(ScanStatus::Infected.to_string(), "INFECTED");
        assert_eq!(ScanStatus::Error.to_string(), "ERROR");
    }

    #[test]
    fn test_parse_rejects_unknown_and_wrong_case() {
        assert_eq!("INFECTED".parse::<ScanStatus>(), Ok(ScanStatus::Infected));
        assert!("clean".parse::<ScanStatus>().is_err());
        assert!("IN_PROGRESS".parse::<ScanStatus>().is_err());
    }


    #[test]
    fn test_result_serializes_status_literal() {
        let result = ScanResult {
            bucket: "b".to_string(),
            key: "clean.txt".to_string(),
            status: ScanStatus::InProgress,
            message: String::new(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "IN PROGRESS");
    }
}
