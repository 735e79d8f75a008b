//! Locating the project's `kiln.toml`.

use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "kiln.toml";

/// Searches for `kiln.toml` starting at a directory and walking up.
///
/// # Example
///
/// ```no_run
/// use kiln_config::ConfigDiscovery;
///
/// let found = ConfigDiscovery::new(".").find();
/// ```
pub struct ConfigDiscovery {
    start: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(start: impl AsRef<Path>) -> Self {
        Self {
            start: start.as_ref().to_path_buf(),
        }
    }

    /// Nearest `kiln.toml` at or above the start directory.
    pub fn find(&self) -> Option<PathBuf> {
        self.start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Directory that owns the nearest `kiln.toml`, or the start directory.
    pub fn project_root(&self) -> PathBuf {
        self.find()
            .and_then(|file| file.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| self.start.clone())
    }
}
