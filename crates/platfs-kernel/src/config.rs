//! Overlay configuration.
//!
//! A project describes its build target in `platfs.toml`:
//!
//! ```toml
//! platform = "ios"
//! prefix = ["tns"]
//! probe_policy = "stop-on-error"
//! root = "app"
//! ```
//!
//! `qualifiers = [...]`, when non-empty, replaces `prefix` + `platform`
//! with an explicit list.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::paths;
use crate::qualifier::{Platform, ProbePolicy, QualifierList};

/// File name looked up by [`OverlayConfig::discover`].
pub const CONFIG_FILE_NAME: &str = "platfs.toml";

/// Settings for one build configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverlayConfig {
    /// Target platform of the build.
    pub platform: Option<Platform>,
    /// Qualifiers tried before the platform's own.
    pub prefix: Vec<String>,
    /// Explicit qualifier list; overrides `prefix` and `platform`.
    pub qualifiers: Vec<String>,
    pub probe_policy: ProbePolicy,
    /// Store root. Relative roots in a file are taken from the file's directory.
    pub root: Option<PathBuf>,
}

impl OverlayConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<string>"),
            source,
        })
    }

    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(root) = &config.root
            && root.is_relative()
            && let Some(dir) = path.parent()
        {
            config.root = Some(dir.join(root));
        }

        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Find and load the config that applies to `start`.
    ///
    /// Walks up from `start` looking for `platfs.toml`, then falls back to
    /// the per-user config file. Returns `None` when neither exists.
    pub fn discover(start: &Path) -> Result<Option<(PathBuf, Self)>, ConfigError> {
        let project = start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file());

        let path = match project {
            Some(path) => path,
            None => {
                let user = paths::user_config_file();
                if !user.is_file() {
                    return Ok(None);
                }
                user
            }
        };

        let config = Self::load(&path)?;
        Ok(Some((path, config)))
    }

    /// The qualifier list this configuration describes.
    pub fn qualifier_list(&self) -> Result<QualifierList, ConfigError> {
        if !self.qualifiers.is_empty() {
            return QualifierList::new(self.qualifiers.iter().cloned());
        }
        let platform = self.platform.ok_or(ConfigError::MissingPlatform)?;
        QualifierList::for_platform(&self.prefix, platform)
    }

    /// Store root, defaulting to the current directory.
    pub fn root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}
