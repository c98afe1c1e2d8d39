/*!
 * Kernel Configuration
 *
 * Defaults, environment overlay and JSON file loading.
 *
 * Environment variables:
 * - KERNEL_MANIFEST_ROOT: directory manifests are resolved against
 * - KERNEL_SPAWN_WHITELIST: comma-separated executable names allowed to spawn
 */

use super::errors::{KernelError, KernelResult};
use super::limits::{
    EMBED_HEIGHT_DEFAULT, EMBED_WIDTH_DEFAULT, POPUP_HEIGHT_DEFAULT, POPUP_WIDTH_DEFAULT,
};
use super::types::TtySize;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default size of a popup presentation, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupDefaults {
    pub width: u32,
    pub height: u32,
}

impl Default for PopupDefaults {
    fn default() -> Self {
        Self {
            width: POPUP_WIDTH_DEFAULT,
            height: POPUP_HEIGHT_DEFAULT,
        }
    }
}

/// Default size of an embedded presentation, in any CSS-style units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedDefaults {
    pub width: String,
    pub height: String,
}

impl Default for EmbedDefaults {
    fn default() -> Self {
        Self {
            width: EMBED_WIDTH_DEFAULT.to_string(),
            height: EMBED_HEIGHT_DEFAULT.to_string(),
        }
    }
}

/// Kernel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Directory manifests are resolved against
    pub manifest_root: PathBuf,
    /// Appended to the executable name to form the manifest location
    pub manifest_suffix: String,
    /// When set, only these executable names may be spawned by name
    pub whitelist: Option<Vec<String>>,
    /// Initial terminal size
    pub tty: TtySize,
    pub popup: PopupDefaults,
    pub embed: EmbedDefaults,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            manifest_root: PathBuf::from("."),
            manifest_suffix: ".json".to_string(),
            whitelist: None,
            tty: TtySize::default(),
            popup: PopupDefaults::default(),
            embed: EmbedDefaults::default(),
        }
    }
}

impl KernelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with the `KERNEL_*` environment variables
    pub fn from_env() -> Self {
        Self::default().overlay_env(|key| std::env::var(key).ok())
    }

    /// Load a JSON configuration file, then apply the environment overlay
    pub fn from_file(path: impl AsRef<Path>) -> KernelResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| KernelError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| KernelError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config.overlay_env(|key| std::env::var(key).ok()))
    }

    fn overlay_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(root) = lookup("KERNEL_MANIFEST_ROOT") {
            self.manifest_root = PathBuf::from(root);
        }
        if let Some(list) = lookup("KERNEL_SPAWN_WHITELIST") {
            let names: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
            self.whitelist = Some(names);
        }
        self
    }

    pub fn with_manifest_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.manifest_root = root.into();
        self
    }

    pub fn with_whitelist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_tty(mut self, cols: u16, rows: u16) -> Self {
        self.tty = TtySize { cols, rows };
        self
    }
}
