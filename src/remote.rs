//! Contract of the remote file service and its Drive v3 implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::token_store::TokenGrant;

/// Fields requested from the listing endpoint.
pub const LIST_FIELDS: &str = "nextPageToken, files(id, name)";

/// One logical call against the file API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRequest {
    ListFiles {
        query: String,
        page_token: Option<String>,
        page_size: Option<u32>,
    },
    Download {
        file_id: String,
    },
}

impl RemoteRequest {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::ListFiles { .. } => "list files",
            Self::Download { .. } => "download",
        }
    }
}

#[derive(Debug, Clone)]
pub enum RemoteResponse {
    Files(FilePage),
    Media(Bytes),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePage {
    #[serde(default)]
    pub files: Vec<RemoteFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// The remote photo store.
///
/// Implementations map transport failures to [`Error::Connectivity`], HTTP 401
/// to [`Error::Unauthorized`], a rejected refresh credential to
/// [`Error::InvalidGrant`] and any other non-2xx status to [`Error::Http`].
#[async_trait]
pub trait RemotePhotoService: Send + Sync {
    async fn send(&self, request: &RemoteRequest, access_token: &str) -> Result<RemoteResponse>;

    async fn refresh(&self, credentials: &Credentials, refresh_token: &str) -> Result<TokenGrant>;
}

/// Google Drive v3 over `reqwest`.
#[derive(Debug, Clone)]
pub struct DriveService {
    http: Client,
    base_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl DriveService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Other(anyhow::anyhow!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl RemotePhotoService for DriveService {
    async fn send(&self, request: &RemoteRequest, access_token: &str) -> Result<RemoteResponse> {
        let operation = request.operation();
        let builder = match request {
            RemoteRequest::ListFiles {
                query,
                page_token,
                page_size,
            } => {
                let mut params = vec![("q", query.clone()), ("fields", LIST_FIELDS.to_string())];
                if let Some(token) = page_token {
                    params.push(("pageToken", token.clone()));
                }
                if let Some(size) = page_size {
                    params.push(("pageSize", size.to_string()));
                }
                self.http.get(self.url("/files")).query(&params)
            }
            RemoteRequest::Download { file_id } => self
                .http
                .get(self.url(&format!("/files/{file_id}")))
                .query(&[("alt", "media")]),
        };

        let response = builder
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| classify(operation, err))?;
        let status = response.status();
        debug!(operation, status = status.as_u16(), "remote response");
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http {
                operation: operation.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        match request {
            RemoteRequest::ListFiles { .. } => {
                let page = response
                    .json::<FilePage>()
                    .await
                    .map_err(|err| classify(operation, err))?;
                Ok(RemoteResponse::Files(page))
            }
            RemoteRequest::Download { .. } => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|err| classify(operation, err))?;
                Ok(RemoteResponse::Media(bytes))
            }
        }
    }

    async fn refresh(&self, credentials: &Credentials, refresh_token: &str) -> Result<TokenGrant> {
        const OPERATION: &str = "token refresh";
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ];
        let response = self
            .http
            .post(&credentials.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|err| classify(OPERATION, err))?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<TokenGrant>()
                .await
                .map_err(|err| classify(OPERATION, err));
        }

        let body = response.text().await.unwrap_or_default();
        let parsed: OAuthErrorBody = serde_json::from_str(&body).unwrap_or_default();
        if parsed.error == "invalid_grant" {
            return Err(Error::InvalidGrant(
                parsed
                    .error_description
                    .unwrap_or_else(|| "invalid_grant".to_string()),
            ));
        }
        Err(Error::Http {
            operation: OPERATION.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

/// Transport problems become [`Error::Connectivity`]; malformed bodies do not.
fn classify(operation: &str, err: reqwest::Error) -> Error {
    if err.is_decode() {
        return Error::Other(anyhow::anyhow!("{operation}: malformed response: {err}"));
    }
    if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
        return Error::connectivity(operation, err);
    }
    Error::Other(anyhow::anyhow!("{operation}: {err}"))
}
