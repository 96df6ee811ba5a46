use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::credentials::{CredentialError, CredentialStore, StoredCredentials};

pub const DEFAULT_GITLAB_URL: &str = "https://gitlab.com";

const CONFIG_FILE: &str = ".mr-viewer.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .mr-viewer.toml.
/// All fields are optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gitlab: GitLabConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitLabConfig {
    /// Instance root URL. If None, falls back to GITLAB_URL env var.
    pub url: Option<String>,
    /// Personal access token. If None, falls back to GITLAB_TOKEN env var.
    pub token: Option<String>,
}

/// Endpoint and token every API call uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub endpoint: String,
    pub token: Option<String>,
}

impl Config {
    /// Load configuration from .mr-viewer.toml in the current directory.
    /// Returns default config if the file doesn't exist; unset values are
    /// then filled from GITLAB_URL and GITLAB_TOKEN.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };

        if config.gitlab.token.is_none() {
            config.gitlab.token = std::env::var("GITLAB_TOKEN").ok();
        }
        if config.gitlab.url.is_none() {
            config.gitlab.url = std::env::var("GITLAB_URL").ok();
        }

        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve settings against whatever `store` holds.
    pub fn settings(&self, store: &dyn CredentialStore) -> Result<Settings, CredentialError> {
        Ok(self.resolve(store.get()?))
    }

    /// Combine with the saved credentials. Saved values win over the config
    /// file and environment; the endpoint defaults to gitlab.com.
    pub fn resolve(&self, stored: StoredCredentials) -> Settings {
        let non_blank = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        let endpoint = non_blank(stored.endpoint)
            .or_else(|| non_blank(self.gitlab.url.clone()))
            .unwrap_or_else(|| DEFAULT_GITLAB_URL.to_string());
        let token = non_blank(stored.token).or_else(|| non_blank(self.gitlab.token.clone()));

        Settings {
            endpoint: endpoint.trim().trim_end_matches('/').to_string(),
            token: token.map(|t| t.trim().to_string()),
        }
    }
}
