use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::client::AuthenticatedClient;
use crate::error::{Error, Result};
use crate::events::PhotoItem;

pub const DEFAULT_CONNECTION_CEILING: u32 = 10;

/// Connection failures seen by catalog fetches over the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    connection_attempts: u32,
    ceiling: u32,
}

impl RetryState {
    pub fn new(ceiling: u32) -> Self {
        Self {
            connection_attempts: 0,
            ceiling: ceiling.max(1),
        }
    }

    pub fn connection_attempts(&self) -> u32 {
        self.connection_attempts
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Count one failure; `true` while another attempt is still allowed.
    pub fn record_connection_failure(&mut self) -> bool {
        self.connection_attempts = self.connection_attempts.saturating_add(1);
        self.connection_attempts < self.ceiling
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECTION_CEILING)
    }
}

/// Paged enumeration of the photos in one remote folder.
pub struct PhotoCatalog {
    client: Arc<AuthenticatedClient>,
    page_size: Option<u32>,
    retry_delay: Duration,
}

impl PhotoCatalog {
    pub fn new(client: Arc<AuthenticatedClient>, page_size: Option<u32>, retry_delay: Duration) -> Self {
        Self {
            client,
            page_size,
            retry_delay,
        }
    }

    /// Collect every page of the folder listing.
    ///
    /// A connection failure restarts the whole listing after `retry_delay`
    /// until `retry` reaches its ceiling; every other error is returned as is.
    pub async fn list_all(&self, folder_id: &str, retry: &mut RetryState) -> Result<Vec<PhotoItem>> {
        loop {
            match self.list_once(folder_id).await {
                Ok(items) => {
                    info!(count = items.len(), "total photos fetched");
                    return Ok(items);
                }
                Err(err) if err.is_connectivity() => {
                    if retry.record_connection_failure() {
                        warn!(
                            attempt = retry.connection_attempts(),
                            ceiling = retry.ceiling(),
                            error = %err,
                            "connection error while listing photos; retrying"
                        );
                        sleep(self.retry_delay).await;
                    } else {
                        error!(
                            attempts = retry.connection_attempts(),
                            error = %err,
                            "maximum connection attempts exceeded"
                        );
                        return Err(Error::RetriesExhausted {
                            attempts: retry.connection_attempts(),
                            message: err.to_string(),
                        });
                    }
                }
                Err(err) => {
                    error!(folder = folder_id, error = %err, "error fetching photos");
                    return Err(err);
                }
            }
        }
    }

    async fn list_once(&self, folder_id: &str) -> Result<Vec<PhotoItem>> {
        let query = folder_query(folder_id);
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_page(&query, page_token.take(), self.page_size)
                .await?;
            debug!(files = page.files.len(), more = page.next_page_token.is_some(), "listed page");
            items.extend(page.files.into_iter().map(|file| PhotoItem {
                remote_id: file.id,
                display_name: file.name,
            }));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(items),
            }
        }
    }
}

/// Listing query selecting the direct children of `folder_id`.
pub fn folder_query(folder_id: &str) -> String {
    format!("'{}' in parents", folder_id.replace('\'', "\\'"))
}
