//! Secrets management for Herald
//!
//! Slack credentials are stored separately from configuration. The secrets file
//! is located at `~/.config/herald/secrets.toml` and must have restrictive
//! permissions (0600 on Unix).
//!
//! Loading priority:
//! 1. Environment variables (SLACK_BOT_TOKEN, SLACK_SIGNING_SECRET)
//! 2. Secrets file (~/.config/herald/secrets.toml)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Secrets structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Secrets {
    pub slack: SlackSecrets,
}

/// Slack app credentials
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SlackSecrets {
    /// Bot user OAuth token (`xoxb-...`)
    pub bot_token: Option<String>,

    /// Signing secret used to verify inbound requests
    pub signing_secret: Option<String>,
}

impl Secrets {
    /// Load secrets from the default location
    ///
    /// Returns default (empty) secrets if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_secrets_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load secrets from a specific file with permission checking
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let metadata = std::fs::metadata(path).map_err(Error::Io)?;
            let mode = metadata.permissions().mode();

            if mode & 0o077 != 0 {
                return Err(Error::Config(format!(
                    "Secrets file {} has insecure permissions {:o}. \
                     Please run: chmod 600 {}",
                    path.display(),
                    mode & 0o777,
                    path.display()
                )));
            }

            debug!(path = %path.display(), mode = format!("{:o}", mode & 0o777), "Secrets file permissions OK");
        }

        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut secrets: Secrets = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse secrets: {}", e)))?;

        for value in [
            &mut secrets.slack.bot_token,
            &mut secrets.slack.signing_secret,
        ]
        .into_iter()
        .flatten()
        {
            *value = value.trim().to_string();
        }

        Ok(secrets)
    }

    /// Get the default secrets file path
    ///
    /// Returns `~/.config/herald/secrets.toml` on Unix
    pub fn default_secrets_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("herald").join("secrets.toml"))
    }

    /// Bot token, SLACK_BOT_TOKEN taking priority over the file
    pub fn bot_token(&self) -> Option<String> {
        pick("SLACK_BOT_TOKEN", self.slack.bot_token.as_deref())
    }

    /// Signing secret, SLACK_SIGNING_SECRET taking priority over the file
    pub fn signing_secret(&self) -> Option<String> {
        pick("SLACK_SIGNING_SECRET", self.slack.signing_secret.as_deref())
    }

    /// Create a template secrets file at the default location
    ///
    /// Creates parent directories if needed and sets secure permissions
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

        let template = r#"# Herald Secrets
# This file contains sensitive credentials - do not share or commit to version control
#
# IMPORTANT: This file must have restrictive permissions (chmod 600)

[slack]
# Bot User OAuth Token (OAuth & Permissions page of your Slack app)
bot_token = ""
# Signing Secret (Basic Information page of your Slack app)
signing_secret = ""
"#;

        std::fs::write(&path, template).map_err(Error::Io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&path, perms).map_err(Error::Io)?;
        }

        warn!(path = %path.display(), "Created secrets template - please edit and add your tokens");

        Ok(path)
    }
}

fn pick(env_key: &str, from_file: Option<&str>) -> Option<String> {
    if let Ok(value) = std::env::var(env_key) {
        let value = value.trim().to_string();
        if !value.is_empty() {
            debug!(variable = env_key, "Using secret from environment");
            return Some(value);
        }
    }

    from_file
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
