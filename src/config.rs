use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Directory holding the credential, token and folder-id files.
    pub auth_dir: PathBuf,
    /// OAuth client secrets file name inside `auth-dir`.
    pub credentials_file: PathBuf,
    /// Token file name inside `auth-dir`; renewed tokens are written back here.
    pub token_file: PathBuf,
    /// File containing the remote folder identifier.
    pub folder_id_file: PathBuf,
    /// Base URL of the remote file API.
    pub api_base_url: String,
    /// Per-request timeout for the HTTP client.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Optional page size for listing calls; the service default applies when unset.
    pub page_size: Option<u32>,
    /// How long each photo stays on screen.
    #[serde(with = "humantime_serde")]
    pub display_duration: Duration,
    /// Pause after a photo fails to download or render.
    #[serde(with = "humantime_serde")]
    pub error_pause: Duration,
    /// Backoff between catalog attempts after a connection failure.
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Connection failures tolerated over the lifetime of the process.
    pub max_connection_attempts: u32,
    /// Counter-clockwise rotation applied to every photo before scaling.
    pub rotate_degrees: u16,
    /// Optional deterministic seed for the per-cycle shuffle.
    pub shuffle_seed: Option<u64>,
    /// Borderless full-screen on the current monitor.
    pub fullscreen: bool,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.api_base_url.trim().is_empty(),
            "api-base-url must not be empty"
        );
        ensure!(
            self.request_timeout > Duration::ZERO,
            "request-timeout must be positive"
        );
        ensure!(
            self.display_duration > Duration::ZERO,
            "display-duration must be positive"
        );
        ensure!(
            self.error_pause > Duration::ZERO,
            "error-pause must be positive"
        );
        ensure!(
            self.retry_delay > Duration::ZERO,
            "retry-delay must be positive"
        );
        ensure!(
            self.max_connection_attempts > 0,
            "max-connection-attempts must be greater than zero"
        );
        ensure!(
            self.page_size != Some(0),
            "page-size must be greater than zero"
        );
        ensure!(
            matches!(self.rotate_degrees, 0 | 90 | 180 | 270),
            "rotate-degrees must be one of 0, 90, 180 or 270 (got {})",
            self.rotate_degrees
        );
        Ok(self)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.auth_dir.join(&self.credentials_file)
    }

    pub fn token_path(&self) -> PathBuf {
        self.auth_dir.join(&self.token_file)
    }

    pub fn folder_id_path(&self) -> PathBuf {
        self.auth_dir.join(&self.folder_id_file)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            auth_dir: PathBuf::from("../auth"),
            credentials_file: PathBuf::from("credentials.json"),
            token_file: PathBuf::from("token.json"),
            folder_id_file: PathBuf::from("folder-id.txt"),
            api_base_url: "https://www.googleapis.com/drive/v3".to_string(),
            request_timeout: Duration::from_secs(60),
            page_size: None,
            display_duration: Duration::from_secs(30),
            error_pause: Duration::from_secs(1),
            retry_delay: Duration::from_secs(5),
            max_connection_attempts: 10,
            rotate_degrees: 270,
            shuffle_seed: None,
            fullscreen: true,
        }
    }
}
