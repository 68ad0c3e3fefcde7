//! Subprocess capability used by the scan engine and the definition refresh.
//!
//! Everything that launches a process goes through [`CommandRunner`], so tests
//! can substitute a fake without touching real binaries.

use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Given a program and its argument list, run it to completion.
///
/// An `Err` means the process could not be launched at all; a process that
/// ran and failed is reported through [`CommandOutput::exit_code`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &Path, args: &[String]) -> io::Result<CommandOutput>;
}

/// Runs real processes on the tokio runtime.
///
/// No timeout is applied. The child is killed if the returned future is
/// dropped before it finishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &Path, args: &[String]) -> io::Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: strip_final_newline(String::from_utf8_lossy(&output.stdout).into_owned()),
            stderr: strip_final_newline(String::from_utf8_lossy(&output.stderr).into_owned()),
        })
    }
}

/// Drop a single trailing `\n` or `\r\n`, keeping any other whitespace.
fn strip_final_newline(mut text: String) -> String {
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    text
}
