use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::token_store::Token;

/// OAuth client material used for refresh grants.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(alias = "token_endpoint_url")]
    pub token_uri: String,
}

/// Source of the secrets the slideshow needs at startup.
pub trait CredentialStore {
    fn credentials(&self) -> Result<Credentials>;
    fn token(&self) -> Result<Token>;
    fn folder_id(&self) -> Result<String>;
    /// Where renewed tokens should be written, if anywhere.
    fn token_path(&self) -> Option<PathBuf>;
}

/// Client secrets as downloaded from the provider console: the client entry
/// sits under `web` or `installed` depending on the application type.
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    web: Option<Credentials>,
    installed: Option<Credentials>,
}

/// Reads everything from the files named in the configuration.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    credentials_path: PathBuf,
    token_path: PathBuf,
    folder_id_path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(
        credentials_path: impl Into<PathBuf>,
        token_path: impl Into<PathBuf>,
        folder_id_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            token_path: token_path.into(),
            folder_id_path: folder_id_path.into(),
        }
    }

    pub fn from_config(cfg: &Configuration) -> Self {
        Self::new(cfg.credentials_path(), cfg.token_path(), cfg.folder_id_path())
    }
}

impl CredentialStore for FileCredentialStore {
    fn credentials(&self) -> Result<Credentials> {
        let file: ClientSecretsFile = read_json(&self.credentials_path)?;
        file.web.or(file.installed).ok_or_else(|| {
            Error::Config(format!(
                "{} has neither a `web` nor an `installed` client entry",
                self.credentials_path.display()
            ))
        })
    }

    fn token(&self) -> Result<Token> {
        let token: Token = read_json(&self.token_path)?;
        if token.refresh_token.trim().is_empty() {
            return Err(Error::Config(format!(
                "{} has an empty refresh_token",
                self.token_path.display()
            )));
        }
        Ok(token)
    }

    fn folder_id(&self) -> Result<String> {
        let raw = fs::read_to_string(&self.folder_id_path).map_err(|err| {
            Error::Config(format!(
                "failed to read {}: {err}",
                self.folder_id_path.display()
            ))
        })?;
        let id = raw.trim();
        if id.is_empty() {
            return Err(Error::Config(format!(
                "{} is empty",
                self.folder_id_path.display()
            )));
        }
        Ok(id.to_string())
    }

    fn token_path(&self) -> Option<PathBuf> {
        Some(self.token_path.clone())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path)
        .map_err(|err| Error::Config(format!("failed to read {}: {err}", path.display())))?;
    serde_json::from_slice(&data)
        .map_err(|err| Error::Config(format!("failed to parse {}: {err}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn store_in(dir: &Path) -> FileCredentialStore {
        FileCredentialStore::new(
            dir.join("credentials.json"),
            dir.join("token.json"),
            dir.join("folder-id.txt"),
        )
    }

    #[test]
    fn loads_web_client_token_and_folder() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("credentials.json"),
            r#"{"web": {"client_id": "id", "client_secret": "secret",
                "token_uri": "https://oauth2.example/token", "project_id": "p"}}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("token.json"),
            r#"{"access_token": "a", "refresh_token": "r", "token_type": "Bearer"}"#,
        )
        .unwrap();
        fs::write(dir.path().join("folder-id.txt"), "  folder-123\n").unwrap();

        let store = store_in(dir.path());
        let creds = store.credentials().unwrap();
        assert_eq!(creds.client_id, "id");
        assert_eq!(creds.token_uri, "https://oauth2.example/token");
        assert_eq!(store.token().unwrap().refresh_token, "r");
        assert_eq!(store.folder_id().unwrap(), "folder-123");
        assert_eq!(store.token_path(), Some(dir.path().join("token.json")));
    }

    #[test]
    fn accepts_installed_client_entry() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("credentials.json"),
            r#"{"installed": {"client_id": "desk", "client_secret": "s", "token_uri": "t"}}"#,
        )
        .unwrap();
        let creds = store_in(dir.path()).credentials().unwrap();
        assert_eq!(creds.client_id, "desk");
    }

    #[test]
    fn missing_or_malformed_material_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(matches!(store.credentials(), Err(Error::Config(_))));
        assert!(matches!(store.token(), Err(Error::Config(_))));
        assert!(matches!(store.folder_id(), Err(Error::Config(_))));

        fs::write(dir.path().join("credentials.json"), r#"{"other": {}}"#).unwrap();
        fs::write(dir.path().join("token.json"), r#"{"access_token": "a"}"#).unwrap();
        fs::write(dir.path().join("folder-id.txt"), "\n").unwrap();
        assert!(matches!(store.credentials(), Err(Error::Config(_))));
        assert!(matches!(store.token(), Err(Error::Config(_))));
        assert!(matches!(store.folder_id(), Err(Error::Config(_))));
    }
}
