//! Configuration management for Skiff
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (SKIFF_*)
//! 3. Config file (~/.config/skiff/config.toml)
//! 4. Default values

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// GitHub account settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Account owning the source repositories and their mirrors
    ///
    /// Resolved from the authenticated token when unset.
    pub owner: Option<String>,
}

/// Temporary mirror lifecycle settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Age after which a mirror is deleted
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,

    /// Interval between cleanup passes
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,

    /// Host used when opening a tab on a finished mirror
    pub tab_host: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(30),
            tab_host: "github.com".to_string(),
        }
    }
}

impl LifecycleConfig {
    pub fn max_age_millis(&self) -> i64 {
        i64::try_from(self.max_age.as_millis()).unwrap_or(i64::MAX)
    }
}

/// ZIP upload settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Commit message used when a connection has not set one
    pub default_commit_message: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            default_commit_message: "Commit from Skiff".to_string(),
        }
    }
}

/// Repository a project's uploads are pushed to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProjectTarget {
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Background router host settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Unix socket front-ends connect to
    pub socket_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Configured socket path, or `~/.cache/skiff/skiff.sock`
    pub fn resolved_socket_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.socket_path {
            return Ok(path.clone());
        }
        dirs::cache_dir()
            .map(|p| p.join("skiff").join("skiff.sock"))
            .ok_or_else(|| Error::Config("Could not determine cache directory".to_string()))
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub lifecycle: LifecycleConfig,
    pub upload: UploadConfig,
    pub server: ServerConfig,
    /// Upload targets keyed by project id
    pub projects: HashMap<String, ProjectTarget>,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if let Some(path) = config_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/skiff/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("skiff").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - SKIFF_OWNER: Account owning sources and mirrors
    /// - SKIFF_SOCKET: Router socket path
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(owner) = std::env::var("SKIFF_OWNER") {
            if !owner.trim().is_empty() {
                self.github.owner = Some(owner.trim().to_string());
            }
        }

        if let Ok(socket) = std::env::var("SKIFF_SOCKET") {
            self.server.socket_path = Some(PathBuf::from(socket));
        }

        self
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, owner: Option<String>, socket: Option<PathBuf>) -> Self {
        if let Some(owner) = owner {
            self.github.owner = Some(owner);
        }

        if let Some(socket) = socket {
            self.server.socket_path = Some(socket);
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(owner: Option<String>, socket: Option<PathBuf>) -> Result<Self> {
        Ok(Self::load()?
            .with_env_overrides()
            .with_cli_overrides(owner, socket))
    }

    /// Upload target for `project_id`, defaulting to a same-named repo on `main`
    pub fn project_target(&self, project_id: &str) -> ProjectTarget {
        self.projects
            .get(project_id)
            .cloned()
            .unwrap_or_else(|| ProjectTarget {
                repo: project_id.to_string(),
                branch: default_branch(),
            })
    }
}
