//! Pipeline configuration.
//!
//! Every field has a default, so an empty TOML file is a valid config:
//!
//! ```toml
//! definitions_dir = "/tmp/clamav"
//! scan_status_tag_name = "scan-status"
//! store_root = "/var/lib/bucketguard/store"
//! versioned_store = true
//! freshclam_config = ["DatabaseMirror database.clamav.net"]
//! ```

use crate::defaults::{
    DEFAULT_CLAMSCAN_PATH, DEFAULT_DEFINITIONS_DIR, DEFAULT_FRESHCLAM_CONFIG,
    DEFAULT_FRESHCLAM_CONFIG_PATH, DEFAULT_FRESHCLAM_PATH, DEFAULT_SCAN_STATUS_TAG_NAME,
    DEFAULT_SCRATCH_DIR, DEFAULT_STORE_DIR_NAME,
};
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AntivirusConfig {
    /// Local signature database directory
    pub definitions_dir: PathBuf,
    /// Directory for per-scan scratch files chosen by the CLI
    pub scratch_dir: PathBuf,
    /// Name of the tag carrying the scan status
    pub scan_status_tag_name: String,
    pub clamscan_path: PathBuf,
    pub freshclam_path: PathBuf,
    /// Where freshclam.conf is written on first update
    pub freshclam_config_path: PathBuf,
    /// Lines of freshclam.conf
    pub freshclam_config: Vec<String>,
    /// Root directory of the local object store
    pub store_root: PathBuf,
    pub versioned_store: bool,
}

impl Default for AntivirusConfig {
    fn default() -> Self {
        Self {
            definitions_dir: PathBuf::from(DEFAULT_DEFINITIONS_DIR),
            scratch_dir: PathBuf::from(DEFAULT_SCRATCH_DIR),
            scan_status_tag_name: DEFAULT_SCAN_STATUS_TAG_NAME.to_string(),
            clamscan_path: PathBuf::from(DEFAULT_CLAMSCAN_PATH),
            freshclam_path: PathBuf::from(DEFAULT_FRESHCLAM_PATH),
            freshclam_config_path: PathBuf::from(DEFAULT_FRESHCLAM_CONFIG_PATH),
            freshclam_config: DEFAULT_FRESHCLAM_CONFIG
                .iter()
                .map(|line| line.to_string())
                .collect(),
            store_root: PathBuf::from(DEFAULT_SCRATCH_DIR).join(DEFAULT_STORE_DIR_NAME),
            versioned_store: false,
        }
    }
}

impl AntivirusConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}
