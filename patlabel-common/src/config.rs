//! Configuration loading and root folder resolution
//!
//! Bootstrap settings come from a small TOML file. A missing file is not an
//! error: a warning is logged and built-in defaults apply. Root folder
//! resolution order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `PATLABEL_ROOT_FOLDER`
//! 3. TOML config file `root_folder`
//! 4. Caller-supplied fallback (typically the project document's folder)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory name under the platform config dir
pub const CONFIG_DIR_NAME: &str = "patlabel";

/// Environment variable overriding the project root folder
pub const ROOT_FOLDER_ENV: &str = "PATLABEL_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Project root folder (subject image folders live below it)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Attribute taxonomy document, relative to the working directory
    #[serde(default = "default_attributes_file")]
    pub attributes_file: PathBuf,

    /// File name of the autosaved project document inside the root folder
    #[serde(default = "default_export_name")]
    pub export_name: String,

    /// Attribute type compared in single-attribute match mode
    #[serde(default = "default_match_axis")]
    pub match_axis: String,

    /// Decoded-image cache capacity in KiB
    #[serde(default = "default_image_cache_kib")]
    pub image_cache_kib: u64,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            attributes_file: default_attributes_file(),
            export_name: default_export_name(),
            match_axis: default_match_axis(),
            image_cache_kib: default_image_cache_kib(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_attributes_file() -> PathBuf {
    PathBuf::from(crate::registry::ATTRIBUTES_FILE)
}

fn default_export_name() -> String {
    "patterns.xml".to_string()
}

fn default_match_axis() -> String {
    crate::matching::DEFAULT_MATCH_AXIS.to_string()
}

/// Default decoded-image cache size in KiB, just under 2 GiB
pub const DEFAULT_IMAGE_CACHE_KIB: u64 = 1024 * 2047;

fn default_image_cache_kib() -> u64 {
    DEFAULT_IMAGE_CACHE_KIB
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Platform config file location (`<config_dir>/patlabel/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join("config.toml"))
}

/// Load the TOML bootstrap config
///
/// `path` overrides the platform default location. A missing file yields
/// defaults with a warning; a malformed file is a configuration error.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(p) => p,
        None => {
            warn!("Could not determine config directory, using defaults");
            return Ok(TomlConfig::default());
        }
    };

    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Resolve the project root folder by priority
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    config: &TomlConfig,
    fallback: &Path,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(root) = &config.root_folder {
        return root.clone();
    }

    // Priority 4: caller fallback
    fallback.to_path_buf()
}

/// Serialize any TOML-backed value and write it atomically
pub fn write_toml<T: Serialize>(value: &T, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(value)?;
    write_atomic(target, content.as_bytes())
}

/// Write the bootstrap config atomically
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    write_toml(config, target)
}

/// Write bytes to `target` via a sibling temp file and rename
///
/// Readers never observe a half-written file.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = target
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| Error::InvalidInput(format!("Not a file path: {}", target.display())))?;
    tmp_name.push(".tmp");
    let tmp_path = target.with_file_name(tmp_name);

    std::fs::write(&tmp_path, bytes)?;
    if let Err(e) = std::fs::rename(&tmp_path, target) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_values() {
        let config = TomlConfig::default();
        assert_eq!(config.attributes_file, PathBuf::from("__attributes.xml"));
        assert_eq!(config.export_name, "patterns.xml");
        assert_eq!(config.match_axis, "cloth-types");
        assert_eq!(config.image_cache_kib, 2_096_128);
        assert_eq!(config.logging.level, "info");
        assert!(config.root_folder.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str("export_name = \"labels.xml\"").unwrap();
        assert_eq!(config.export_name, "labels.xml");
        assert_eq!(config.match_axis, "cloth-types");
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("out.txt");

        write_atomic(&target, b"hello").unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello");
        assert!(!dir.path().join("nested").join("out.txt.tmp").exists());
    }

    #[test]
    fn test_write_atomic_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.txt");
        std::fs::write(&target, "old").unwrap();

        write_atomic(&target, b"new").unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
    }
}
