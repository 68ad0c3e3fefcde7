//! CLI module for Bucketguard
//!
//! Each command module takes its parsed arguments plus the shared
//! [`bucketguard_av::ScanOrchestrator`] and returns an [`Outcome`].

pub mod config;
pub mod definitions;
pub mod error;
pub mod output;
pub mod scan;
pub mod status;

use std::process::ExitCode;

pub const EXIT_INFECTED: u8 = 1;
pub const EXIT_ERROR: u8 = 2;

/// Result of a command that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The scanned object is infected
    Infected,
}

impl Outcome {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::Infected => ExitCode::from(EXIT_INFECTED),
        }
    }
}
