use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio::select;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::{PhotoCatalog, RetryState};
use crate::client::AuthenticatedClient;
use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::events::{DisplayFrame, PhotoItem};
use crate::processing::frame::ImageProcessor;

/// Where finished frames go.
#[async_trait]
pub trait DisplaySink: Send {
    /// Fixed `(width, height)` of the display surface.
    fn size(&self) -> (u32, u32);

    async fn present(&mut self, frame: DisplayFrame) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct SlideshowTiming {
    pub display_duration: Duration,
    pub error_pause: Duration,
    pub empty_catalog_pause: Duration,
}

impl From<&Configuration> for SlideshowTiming {
    fn from(cfg: &Configuration) -> Self {
        Self {
            display_duration: cfg.display_duration,
            error_pause: cfg.error_pause,
            empty_catalog_pause: cfg.retry_delay,
        }
    }
}

impl Default for SlideshowTiming {
    fn default() -> Self {
        Self::from(&Configuration::default())
    }
}

#[derive(Debug)]
pub enum SlideshowState {
    Fetching,
    Shuffling(Vec<PhotoItem>),
    Displaying { items: Vec<PhotoItem>, index: usize },
    Halted(Error),
}

impl SlideshowState {
    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halted(_))
    }
}

/// Fetch, shuffle, then show one photo at a time, forever.
pub struct SlideshowController<D: DisplaySink> {
    folder_id: String,
    catalog: PhotoCatalog,
    client: Arc<AuthenticatedClient>,
    processor: ImageProcessor,
    sink: D,
    timing: SlideshowTiming,
    retry: RetryState,
    rng: StdRng,
}

impl<D: DisplaySink> SlideshowController<D> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        folder_id: impl Into<String>,
        catalog: PhotoCatalog,
        client: Arc<AuthenticatedClient>,
        processor: ImageProcessor,
        sink: D,
        timing: SlideshowTiming,
        retry: RetryState,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            folder_id: folder_id.into(),
            catalog,
            client,
            processor,
            sink,
            timing,
            retry,
            rng,
        }
    }

    pub fn retry_state(&self) -> &RetryState {
        &self.retry
    }

    pub fn sink(&self) -> &D {
        &self.sink
    }

    /// Run until a fatal error (returned) or cancellation (`Ok`).
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let (width, height) = self.sink.size();
        info!(width, height, folder = %self.folder_id, "slideshow starting");
        let mut state = SlideshowState::Fetching;
        loop {
            state = select! {
                _ = cancel.cancelled() => {
                    info!("cancel received; stopping slideshow");
                    return Ok(());
                }
                next = self.advance(state) => next,
            };
            state = match state {
                SlideshowState::Halted(err) => {
                    error!(error = %err, "slideshow halted");
                    return Err(err);
                }
                other => other,
            };
        }
    }

    /// Perform the work of `state` and return its successor.
    pub async fn advance(&mut self, state: SlideshowState) -> SlideshowState {
        match state {
            SlideshowState::Fetching => {
                match self.catalog.list_all(&self.folder_id, &mut self.retry).await {
                    Ok(items) if items.is_empty() => {
                        warn!(folder = %self.folder_id, "folder has no photos; waiting before refetch");
                        sleep(self.timing.empty_catalog_pause).await;
                        SlideshowState::Fetching
                    }
                    Ok(items) => SlideshowState::Shuffling(items),
                    Err(err) => SlideshowState::Halted(err),
                }
            }
            SlideshowState::Shuffling(mut items) => {
                items.shuffle(&mut self.rng);
                debug!(count = items.len(), "shuffled catalog");
                SlideshowState::Displaying { items, index: 0 }
            }
            SlideshowState::Displaying { items, index } => {
                let Some(item) = items.get(index) else {
                    return SlideshowState::Fetching;
                };
                match self.show(item).await {
                    Ok(()) => sleep(self.timing.display_duration).await,
                    Err(err) => {
                        error!(
                            item = %item.remote_id,
                            name = %item.display_name,
                            error = %err,
                            credentials_rejected = err.is_credential_fatal(),
                            "error displaying photo"
                        );
                        sleep(self.timing.error_pause).await;
                    }
                }
                let next = index + 1;
                if next < items.len() {
                    SlideshowState::Displaying { items, index: next }
                } else {
                    SlideshowState::Fetching
                }
            }
            SlideshowState::Halted(err) => SlideshowState::Halted(err),
        }
    }

    async fn show(&mut self, item: &PhotoItem) -> Result<()> {
        let bytes = self.client.download(&item.remote_id).await?;
        let (width, height) = self.sink.size();
        let processor = self.processor;
        let frame = tokio::task::spawn_blocking(move || processor.process(&bytes, width, height))
            .await
            .map_err(|err| Error::Other(anyhow::anyhow!("image worker failed: {err}")))??;
        if frame.dimensions() != (width, height) {
            return Err(Error::Display(format!(
                "frame is {}x{}, display is {width}x{height}",
                frame.width, frame.height
            )));
        }
        self.sink.present(frame).await?;
        info!(item = %item.remote_id, name = %item.display_name, "photo displayed");
        Ok(())
    }
}
