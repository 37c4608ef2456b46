//! TOML configuration: logging options plus one table per model.
//!
//! ```toml
//! [logging]
//! dir = "logs"
//! level = "debug"
//!
//! [models.user]
//! field_map = { x = "location.x" }
//! sort = ["-created"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::{OdmError, Result};
use crate::model::ModelConfig;

pub const CONFIG_ENV: &str = "DOCMAP_CONFIG";
pub const CONFIG_FILE: &str = "docmap.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub dir: Option<PathBuf>,
    pub level: Option<String>,
    pub retention: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OdmConfig {
    pub logging: LoggingConfig,
    pub models: BTreeMap<String, ModelConfig>,
}

impl OdmConfig {
    /// # Errors
    /// `Toml` for syntax or shape errors, `Config` for an empty model name.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: Self = toml::from_str(s)?;
        for (name, model) in &mut cfg.models {
            if name.is_empty() {
                return Err(OdmError::Config("model table with an empty name".into()));
            }
            model.name.clone_from(name);
        }
        Ok(cfg)
    }

    /// # Errors
    /// `Io` when the file cannot be read, otherwise see [`from_toml_str`](Self::from_toml_str).
    pub fn from_path(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    /// Candidate files in precedence order: `explicit`, `$DOCMAP_CONFIG`, `./docmap.toml`,
    /// `~/.config/docmap.toml`.
    #[must_use]
    pub fn search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(p) = explicit {
            paths.push(p.to_path_buf());
        }
        if let Ok(p) = std::env::var(CONFIG_ENV) {
            paths.push(PathBuf::from(p));
        }
        if let Ok(cur) = std::env::current_dir() {
            paths.push(cur.join(CONFIG_FILE));
        }
        if let Some(home) = dirs_next::home_dir() {
            paths.push(home.join(".config").join(CONFIG_FILE));
        }
        paths
    }

    /// Loads the first configuration file found, or the defaults when none exists.
    ///
    /// An explicit path that does not exist is an error.
    ///
    /// # Errors
    /// `Config` for a missing explicit path; read or parse errors of the chosen file.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit
            && !p.exists()
        {
            return Err(OdmError::Config(format!("config file not found: {}", p.display())));
        }
        for p in Self::search_paths(explicit) {
            if p.is_file() {
                log::debug!("loading configuration from {}", p.display());
                return Self::from_path(&p);
            }
        }
        Ok(Self::default())
    }

    /// The configuration for `name`, or defaults when the file never mentions it.
    #[must_use]
    pub fn model(&self, name: &str) -> ModelConfig {
        self.models.get(name).cloned().unwrap_or_else(|| ModelConfig::new(name))
    }
}
