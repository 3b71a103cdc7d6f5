//! Ghost player configuration (`config.toml`)
//!
//! Every field has a default, so an empty or partial file is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ghost::Color;
use crate::host::{GhostAppearance, SearchPathResolver};

/// Ghost player settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostConfig {
    /// Hold ghosts at level boundaries until the live player arrives
    /// (default: false)
    #[serde(default)]
    pub sync: bool,
    /// Model new ghosts are drawn with
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Colour new ghosts are drawn with (default: white)
    #[serde(default)]
    pub default_color: Color,
    /// Extension appended to demo names given without one (default: "dem")
    #[serde(default = "default_demo_extension")]
    pub demo_extension: String,
    /// Extra directories searched for demo files
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

fn default_model() -> String {
    "models/props/food_can/food_can_open.mdl".to_string()
}

fn default_demo_extension() -> String {
    "dem".to_string()
}

impl Default for GhostConfig {
    fn default() -> Self {
        Self {
            sync: false,
            default_model: default_model(),
            default_color: Color::default(),
            demo_extension: default_demo_extension(),
            search_paths: Vec::new(),
        }
    }
}

impl GhostConfig {
    /// Read a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read `config.toml` from the platform config directory, falling back
    /// to defaults when it is missing or invalid
    pub fn load_or_default() -> Self {
        let Some(path) = config_dir().map(|dir| dir.join("config.toml")) else {
            return Self::default();
        };
        if !path.is_file() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    pub fn appearance(&self) -> GhostAppearance {
        GhostAppearance {
            model: self.default_model.clone(),
            color: self.default_color,
        }
    }

    pub fn resolver(&self) -> SearchPathResolver {
        SearchPathResolver::new(self.search_paths.clone())
    }
}

/// `name` with `.<extension>` appended unless it already ends with it
pub fn demo_file_name(name: &str, extension: &str) -> PathBuf {
    let suffix = format!(".{}", extension);
    if name.ends_with(&suffix) {
        PathBuf::from(name)
    } else {
        PathBuf::from(format!("{}{}", name, suffix))
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Linux: `~/.config/demoghost`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "demoghost").map(|dirs| dirs.config_dir().to_path_buf())
}
