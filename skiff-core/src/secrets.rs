//! Credentials for the remote repository host
//!
//! The token lives outside the main config in `~/.config/skiff/secrets.toml`,
//! which must not be readable by group or others (0600 on Unix).
//!
//! Loading priority:
//! 1. `SKIFF_GITHUB_TOKEN`, then `GITHUB_TOKEN`
//! 2. Secrets file

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

const TOKEN_ENV_VARS: [&str; 2] = ["SKIFF_GITHUB_TOKEN", "GITHUB_TOKEN"];

/// Secrets file contents
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Secrets {
    pub github: GitHubSecrets,
}

/// GitHub credentials
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubSecrets {
    /// Personal access token with `repo` and `delete_repo` scopes
    pub token: Option<String>,
}

impl Secrets {
    /// Load secrets from the default location, empty if the file is missing
    pub fn load() -> Result<Self> {
        match Self::default_secrets_path() {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load secrets from `path`, rejecting files readable by others
    pub fn load_from_file(path: &Path) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mode = std::fs::metadata(path).map_err(Error::Io)?.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(Error::Config(format!(
                    "Secrets file {} has insecure permissions {:o}. \
                     Please run: chmod 600 {}",
                    path.display(),
                    mode & 0o777,
                    path.display()
                )));
            }
        }

        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut secrets: Secrets = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse secrets: {}", e)))?;

        secrets.github.token = secrets
            .github
            .token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(secrets)
    }

    /// `~/.config/skiff/secrets.toml`
    pub fn default_secrets_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("skiff").join("secrets.toml"))
    }

    /// GitHub token, preferring the environment over the secrets file
    pub fn github_token(&self) -> Option<String> {
        for var in TOKEN_ENV_VARS {
            if let Ok(token) = std::env::var(var) {
                let token = token.trim();
                if !token.is_empty() {
                    debug!(var, "Using GitHub token from environment");
                    return Some(token.to_string());
                }
            }
        }

        self.github.token.clone().inspect(|_| {
            debug!("Using GitHub token from secrets file");
        })
    }

    /// Write an empty secrets template with 0600 permissions
    pub fn create_template() -> Result<PathBuf> {
        let path = Self::default_secrets_path()
            .ok_or_else(|| Error::Config("Could not determine secrets path".to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }

        if path.exists() {
            return Err(Error::Config(format!(
                "Secrets file already exists at {}",
                path.display()
            )));
        }

        let template = r#"# Skiff secrets - keep this file private (chmod 600)

[github]
# Personal access token. Mirrors are created and deleted on your account,
# so the token needs the `repo` and `delete_repo` scopes.
token = ""
"#;

        std::fs::write(&path, template).map_err(Error::Io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .map_err(Error::Io)?;
        }

        warn!(path = %path.display(), "Created secrets template - add your GitHub token");

        Ok(path)
    }
}
