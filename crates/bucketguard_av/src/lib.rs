//! Bucketguard AV - malware scanning for objects in a bucket store
//!
//! Scans one object per call with ClamAV and records the verdict as an object
//! tag. Also mirrors the signature database between a bucket and the local
//! definitions directory.
//!
//! # Usage
//!
//! ```rust,ignore
//! use bucketguard_av::{AntivirusConfig, ScanOrchestrator};
//!
//! let config = AntivirusConfig::from_toml_file(Path::new("config.toml"))?;
//! let scanner = ScanOrchestrator::new(&config, None);
//!
//! scanner.download_definitions("av-definitions").await?;
//! let result = scanner.scan("uploads", "invoice.pdf", Path::new("/tmp/bucketguard/1")).await?;
//! println!("{}: {}", result.key, result.status);
//! ```

pub mod config;
pub mod defaults;
pub mod definitions;
pub mod engine;
pub mod error;
pub mod runner;
pub mod scanner;
pub mod stager;
pub mod status;
pub mod store;
pub mod tagger;

pub use config::AntivirusConfig;
pub use definitions::{is_definition_file, DefinitionStore};
pub use engine::{EngineVerdict, ScanEngine};
pub use error::{ConfigError, DefinitionError, ProcessError, ScanError, StageError, StoreError};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
pub use scanner::{default_store, ScanOrchestrator};
pub use stager::{ObjectStager, ScratchFile};
pub use status::{ScanResult, ScanStatus};
pub use store::{LocalObjectStore, MemoryObjectStore, ObjectStore, Tag};
pub use tagger::ScanStatusTagger;
