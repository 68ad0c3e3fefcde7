//! Bucketguard command-line front end
//!
//! One invocation handles one object or one definitions operation. Exit codes:
//! - 0: scan clean, or the command succeeded
//! - 1: scan found an infection
//! - 2: any error

use bucketguard_logging::{init_logging, LogConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

use cli::config::ConfigOverrides;
use cli::definitions::DefinitionsAction;
use cli::{Outcome, EXIT_ERROR};

#[derive(Parser, Debug)]
#[command(
    name = "bucketguard",
    version,
    about = "Malware scanning for objects in a bucket store"
)]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (TOML). Defaults to $BUCKETGUARD_HOME/config.toml when present
    #[arg(long, global = true, env = "BUCKETGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory of the local object store
    #[arg(long, global = true, env = "BUCKETGUARD_STORE_ROOT")]
    store_root: Option<PathBuf>,

    /// Local signature database directory
    #[arg(long, global = true, env = "BUCKETGUARD_DEFINITIONS_DIR")]
    definitions_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan one object and tag it with the verdict
    Scan {
        #[arg(long)]
        bucket: String,

        #[arg(long)]
        key: String,

        /// Scratch file for the object content (default: <scratch_dir>/<uuid>)
        #[arg(long)]
        scratch: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the scan status tag of an object
    Status {
        #[arg(long)]
        bucket: String,

        #[arg(long)]
        key: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sync and refresh the signature database
    Definitions {
        #[command(subcommand)]
        action: DefinitionsAction,
    },
}

fn command_wants_json(command: &Commands) -> bool {
    match command {
        Commands::Scan { json, .. } => *json,
        Commands::Status { json, .. } => *json,
        Commands::Definitions { action } => action.wants_json(),
    }
}

async fn run_command(cli: Cli) -> anyhow::Result<Outcome> {
    let overrides = ConfigOverrides {
        config: cli.config,
        store_root: cli.store_root,
        definitions_dir: cli.definitions_dir,
    };
    let config = cli::config::load_config(&overrides)?;
    let scanner = bucketguard_av::ScanOrchestrator::new(&config, None);

    match cli.command {
        Commands::Scan {
            bucket,
            key,
            scratch,
            json,
        } => {
            cli::scan::run(
                &scanner,
                &config,
                cli::scan::ScanArgs {
                    bucket,
                    key,
                    scratch,
                    json,
                },
            )
            .await
        }
        Commands::Status { bucket, key, json } => {
            cli::status::run(&scanner, cli::status::StatusArgs { bucket, key, json }).await
        }
        Commands::Definitions { action } => cli::definitions::run(&scanner, &config, action).await,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = command_wants_json(&cli.command);

    if let Err(err) = init_logging(LogConfig {
        app_name: "bucketguard",
        verbose: cli.verbose,
        quiet: json_mode,
    }) {
        eprintln!("Warning: failed to initialize logging: {}", err);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start async runtime: {}", err);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    match runtime.block_on(run_command(cli)) {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else {
                eprintln!("{:?}", err);
            }
            ExitCode::from(EXIT_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan_with_globals() {
        let cli = Cli::try_parse_from([
            "bucketguard",
            "scan",
            "--bucket",
            "uploads",
            "--key",
            "docs/a.pdf",
            "--json",
            "--store-root",
            "/srv/store",
        ])
        .unwrap();

        assert_eq!(cli.store_root, Some(PathBuf::from("/srv/store")));
        assert!(command_wants_json(&cli.command));
        match cli.command {
            Commands::Scan {
                bucket,
                key,
                scratch,
                ..
            } => {
                assert_eq!(bucket, "uploads");
                assert_eq!(key, "docs/a.pdf");
                assert_eq!(scratch, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_definitions_update_lines() {
        let cli = Cli::try_parse_from([
            "bucketguard",
            "definitions",
            "update",
            "--config-line",
            "DatabaseMirror mirror.example.org",
            "--config-line",
            "ScriptedUpdates no",
        ])
        .unwrap();

        match cli.command {
            Commands::Definitions {
                action: DefinitionsAction::Update { config_line, .. },
            } => assert_eq!(
                config_line,
                vec!["DatabaseMirror mirror.example.org", "ScriptedUpdates no"]
            ),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_scan_requires_bucket_and_key() {
        assert!(Cli::try_parse_from(["bucketguard", "scan", "--bucket", "b"]).is_err());
    }
}
