use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::remote::{FilePage, RemotePhotoService, RemoteRequest, RemoteResponse};
use crate::token_store::{Token, TokenStore};

/// Issues remote calls with the stored access token and renews it on 401.
///
/// Each logical call performs at most one renewal: a 401 on the retried call
/// surfaces as [`Error::AuthenticationFailed`].
pub struct AuthenticatedClient {
    service: Arc<dyn RemotePhotoService>,
    credentials: Credentials,
    tokens: Arc<TokenStore>,
}

impl AuthenticatedClient {
    pub fn new(
        service: Arc<dyn RemotePhotoService>,
        credentials: Credentials,
        tokens: Arc<TokenStore>,
    ) -> Self {
        Self {
            service,
            credentials,
            tokens,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub async fn request(&self, request: &RemoteRequest) -> Result<RemoteResponse> {
        let token = self.tokens.current();
        match self.service.send(request, &token.access_token).await {
            Err(Error::Unauthorized) => {}
            other => return other,
        }

        info!(operation = request.operation(), "access token rejected; refreshing");
        self.renew(&token).await?;

        let token = self.tokens.current();
        match self.service.send(request, &token.access_token).await {
            Err(Error::Unauthorized) => {
                warn!(
                    operation = request.operation(),
                    "access token rejected again after refresh"
                );
                Err(Error::AuthenticationFailed)
            }
            other => other,
        }
    }

    async fn renew(&self, token: &Token) -> Result<()> {
        let grant = self
            .service
            .refresh(&self.credentials, &token.refresh_token)
            .await?;
        self.tokens.update(grant).await;
        Ok(())
    }

    pub async fn list_page(
        &self,
        query: &str,
        page_token: Option<String>,
        page_size: Option<u32>,
    ) -> Result<FilePage> {
        let request = RemoteRequest::ListFiles {
            query: query.to_string(),
            page_token,
            page_size,
        };
        match self.request(&request).await? {
            RemoteResponse::Files(page) => Ok(page),
            RemoteResponse::Media(_) => Err(unexpected(&request)),
        }
    }

    pub async fn download(&self, file_id: &str) -> Result<Bytes> {
        let request = RemoteRequest::Download {
            file_id: file_id.to_string(),
        };
        match self.request(&request).await? {
            RemoteResponse::Media(bytes) => Ok(bytes),
            RemoteResponse::Files(_) => Err(unexpected(&request)),
        }
    }
}

fn unexpected(request: &RemoteRequest) -> Error {
    Error::Other(anyhow::anyhow!(
        "{}: service returned a response of the wrong kind",
        request.operation()
    ))
}

/// Exercise the refresh credential once without touching any stored token.
///
/// Returns `Ok(false)` when the token endpoint rejects the grant.
pub async fn check_refresh_token(
    service: &dyn RemotePhotoService,
    credentials: &Credentials,
    token: &Token,
) -> Result<bool> {
    match service.refresh(credentials, &token.refresh_token).await {
        Ok(_) => Ok(true),
        Err(Error::InvalidGrant(reason)) => {
            warn!(%reason, "refresh token rejected");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}
