//! Config resolution for the CLI
//!
//! Priority:
//! 1. `--config` / `BUCKETGUARD_CONFIG` (must exist)
//! 2. `$BUCKETGUARD_HOME/config.toml` (used when present)
//! 3. Built-in defaults
//!
//! `--store-root` and `--definitions-dir` override the loaded values.

use anyhow::{Context, Result};
use bucketguard_av::AntivirusConfig;
use bucketguard_logging::bucketguard_home;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config: Option<PathBuf>,
    pub store_root: Option<PathBuf>,
    pub definitions_dir: Option<PathBuf>,
}

/// Get config file path: $BUCKETGUARD_HOME/config.toml
pub fn default_config_path() -> PathBuf {
    bucketguard_home().join("config.toml")
}

pub fn load_config(overrides: &ConfigOverrides) -> Result<AntivirusConfig> {
    load_config_with_fallback(overrides, &default_config_path())
}

fn load_config_with_fallback(
    overrides: &ConfigOverrides,
    fallback_path: &Path,
) -> Result<AntivirusConfig> {
    let mut config = match &overrides.config {
        Some(path) => AntivirusConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None if fallback_path.is_file() => AntivirusConfig::from_toml_file(fallback_path)
            .with_context(|| format!("Failed to load config {}", fallback_path.display()))?,
        None => AntivirusConfig::default(),
    };

    if let Some(store_root) = &overrides.store_root {
        config.store_root = store_root.clone();
    }
    if let Some(definitions_dir) = &overrides.definitions_dir {
        config.definitions_dir = definitions_dir.clone();
    }

    debug!(?config, "Resolved configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_any_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config =
            load_config_with_fallback(&ConfigOverrides::default(), &tmp.path().join("config.toml"))
                .unwrap();
        assert_eq!(config, AntivirusConfig::default());
    }

    #[test]
    fn test_home_config_is_picked_up() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "scan_status_tag_name = \"av\"\n").unwrap();

        let config = load_config_with_fallback(&ConfigOverrides::default(), &path).unwrap();
        assert_eq!(config.scan_status_tag_name, "av");
    }

    #[test]
    fn test_explicit_config_wins_and_flags_override() {
        let tmp = tempfile::tempdir().unwrap();
        let home_config = tmp.path().join("config.toml");
        std::fs::write(&home_config, "scan_status_tag_name = \"home\"\n").unwrap();
        let explicit = tmp.path().join("explicit.toml");
        std::fs::write(
            &explicit,
            "scan_status_tag_name = \"explicit\"\nstore_root = \"/from/file\"\n",
        )
        .unwrap();

        let overrides = ConfigOverrides {
            config: Some(explicit),
            store_root: Some(PathBuf::from("/from/flag")),
            definitions_dir: Some(PathBuf::from("/defs")),
        };
        let config = load_config_with_fallback(&overrides, &home_config).unwrap();

        assert_eq!(config.scan_status_tag_name, "explicit");
        assert_eq!(config.store_root, PathBuf::from("/from/flag"));
        assert_eq!(config.definitions_dir, PathBuf::from("/defs"));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let overrides = ConfigOverrides {
            config: Some(tmp.path().join("nope.toml")),
            ..ConfigOverrides::default()
        };
        let err = load_config_with_fallback(&overrides, &tmp.path().join("config.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }
}
