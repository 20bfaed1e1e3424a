//! User configuration.
//!
//! Settings are read from `~/.config/dockernel/config.toml` (the platform
//! config dir as reported by `dirs`). Every key is optional:
//!
//! ```toml
//! # Container engine CLI, a name on PATH or an absolute path
//! docker = "podman"
//!
//! # Grace period between the stop request and the force kill
//! stop_timeout = "30s"
//!
//! # Install kernelspecs here instead of the Jupyter user data dir
//! kernels_dir = "/opt/jupyter/kernels"
//! ```
//!
//! `DOCKERNEL_DOCKER` overrides `docker`.

use crate::error::{Error, Result};
use crate::kernelspec::default_kernels_dir;
use crate::runtime::docker::DEFAULT_DOCKER_BINARY;
use crate::shutdown::DEFAULT_STOP_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the docker binary.
pub const DOCKER_BINARY_ENV: &str = "DOCKERNEL_DOCKER";

/// On-disk configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Container engine CLI.
    pub docker: Option<String>,
    /// Stop grace period, humantime syntax.
    pub stop_timeout: Option<String>,
    /// Kernelspec registry override.
    pub kernels_dir: Option<PathBuf>,
}

/// Resolved settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Container engine CLI.
    pub docker: String,
    /// Stop grace period.
    pub stop_timeout: Duration,
    /// Kernelspec registry override.
    pub kernels_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            docker: DEFAULT_DOCKER_BINARY.to_string(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            kernels_dir: None,
        }
    }
}

impl Settings {
    /// Load settings from the default config file and environment.
    ///
    /// A missing file yields defaults; an unreadable or invalid one is an error.
    pub fn load() -> Result<Self> {
        let mut settings = match Self::config_path() {
            Some(path) => Self::load_from(&path)?,
            None => {
                tracing::debug!("no config directory found, using defaults");
                Self::default()
            }
        };

        if let Some(docker) = std::env::var(DOCKER_BINARY_ENV)
            .ok()
            .filter(|d| !d.is_empty())
        {
            settings.docker = docker;
        }
        Ok(settings)
    }

    /// Load settings from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config("read", format!("{}: {}", path.display(), e)))?;
        let settings = Self::parse(&contents)
            .map_err(|e| Error::config("parse", format!("{}: {}", path.display(), e)))?;

        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(settings)
    }

    /// Parse TOML config contents.
    pub fn parse(contents: &str) -> std::result::Result<Self, String> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| e.to_string())?;
        let defaults = Self::default();

        let stop_timeout = match file.stop_timeout {
            Some(s) => humantime::parse_duration(&s)
                .map_err(|e| format!("invalid stop_timeout '{}': {}", s, e))?,
            None => defaults.stop_timeout,
        };

        Ok(Self {
            docker: file.docker.unwrap_or(defaults.docker),
            stop_timeout,
            kernels_dir: file.kernels_dir,
        })
    }

    /// Path of the config file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("dockernel").join("config.toml"))
    }

    /// Kernelspec registry: explicit override, then config, then the Jupyter default.
    pub fn kernels_dir(&self, cli_override: Option<&Path>) -> Result<PathBuf> {
        cli_override
            .map(Path::to_path_buf)
            .or_else(|| self.kernels_dir.clone())
            .or_else(default_kernels_dir)
            .ok_or_else(|| Error::config("locate kernelspec registry", "no data directory found"))
    }
}
