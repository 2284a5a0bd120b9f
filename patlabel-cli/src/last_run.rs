//! Last-run state
//!
//! Where the previous session left off, stored as TOML next to the attribute
//! taxonomy. Loading is lenient: a missing or malformed file yields defaults.

use patlabel_common::config::write_toml;
use patlabel_common::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the last-run state
pub const LAST_RUN_FILE: &str = "__lastrun.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRunInfo {
    /// Project root folder of the last session
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Subject shown last
    #[serde(default)]
    pub subject_index: usize,

    /// Folder the pattern catalog was collected from
    #[serde(default)]
    pub pattern_dir: Option<PathBuf>,
}

impl LastRunInfo {
    /// Path of the last-run file beside `attributes_file`
    pub fn path_beside(attributes_file: &Path) -> PathBuf {
        attributes_file
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(LAST_RUN_FILE)
    }

    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No last-run state at {}: {}", path.display(), e);
                return Self::default();
            }
        };
        match toml::from_str(&content) {
            Ok(info) => info,
            Err(e) => {
                warn!("Ignoring malformed last-run state {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_toml(self, path)
    }

    /// Root folder to use when neither the command line nor the config
    /// names one: the last root if it still exists, else `cwd`
    pub fn root_fallback(&self, cwd: &Path) -> PathBuf {
        match &self.root_folder {
            Some(root) if root.is_dir() => root.clone(),
            _ => cwd.to_path_buf(),
        }
    }
}
