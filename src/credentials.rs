//! Locally persisted personal access token and instance URL.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::mr::MrError;

/// Prefix every GitLab personal access token carries.
pub const TOKEN_PREFIX: &str = "glpat-";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to access credential file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse credential file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write credential file: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine the user configuration directory")]
    NoConfigDir,
}

/// The two values the store keeps, under fixed key names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(rename = "gitlab_pat", default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(rename = "gitlab_url", default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Check a token before it is saved. Never touches the network.
pub fn validate_token(token: &str) -> Result<String, MrError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(MrError::ValidationError(
            "Please enter a Personal Access Token".to_string(),
        ));
    }
    if !token.starts_with(TOKEN_PREFIX) {
        return Err(MrError::ValidationError(format!(
            "Personal Access Token should start with \"{TOKEN_PREFIX}\""
        )));
    }
    Ok(token.to_string())
}

/// Check an instance URL before it is saved.
pub fn validate_endpoint(endpoint: &str) -> Result<String, MrError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(MrError::ValidationError(
            "Please enter a GitLab instance URL".to_string(),
        ));
    }
    let parsed = reqwest::Url::parse(endpoint)
        .map_err(|_| MrError::ValidationError(format!("Invalid GitLab instance URL: {endpoint}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(MrError::ValidationError(format!(
            "GitLab instance URL must use http or https: {endpoint}"
        )));
    }
    Ok(endpoint.trim_end_matches('/').to_string())
}

/// Where the token and instance URL are kept between runs.
pub trait CredentialStore {
    /// Saved credentials; empty if nothing was ever saved.
    fn get(&self) -> Result<StoredCredentials, CredentialError>;

    /// Save both values, replacing anything saved before.
    fn set(&self, credentials: &StoredCredentials) -> Result<(), CredentialError>;

    fn clear(&self) -> Result<(), CredentialError>;
}

/// TOML file holding the saved credentials.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/mr-viewer/credentials.toml`
    pub fn default_location() -> Result<Self, CredentialError> {
        let dir = dirs::config_dir().ok_or(CredentialError::NoConfigDir)?;
        Ok(Self::new(dir.join("mr-viewer").join("credentials.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Result<StoredCredentials, CredentialError> {
        if !self.path.exists() {
            return Ok(StoredCredentials::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&contents)?)
    }

    fn set(&self, credentials: &StoredCredentials) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, toml::to_string(credentials)?)?;
        restrict_permissions(&self.path)?;
        debug!(path = %self.path.display(), "saved credentials");
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            debug!(path = %self.path.display(), "cleared credentials");
        }
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
