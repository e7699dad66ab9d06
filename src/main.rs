//! Binary entrypoint for the Drive photo frame.
//!
//! Wires configuration, credentials and the remote service into the slideshow
//! task, then runs the full-screen viewer on the main thread.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use drive_photo_frame::catalog::{PhotoCatalog, RetryState};
use drive_photo_frame::client::{AuthenticatedClient, check_refresh_token};
use drive_photo_frame::config::Configuration;
use drive_photo_frame::credentials::{CredentialStore, Credentials, FileCredentialStore};
use drive_photo_frame::events::DisplayFrame;
use drive_photo_frame::processing::frame::{ImageProcessor, Rotation};
use drive_photo_frame::remote::{DriveService, RemotePhotoService};
use drive_photo_frame::tasks::slideshow::{SlideshowController, SlideshowTiming};
use drive_photo_frame::tasks::viewer::{self, ChannelSink};
use drive_photo_frame::token_store::{Token, TokenStore};

#[derive(Debug, Parser)]
#[command(
    name = "drive-photo-frame",
    version,
    about = "Full-screen slideshow of a remote photo folder"
)]
struct Cli {
    /// Path to YAML config file (built-in defaults when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verify the stored refresh token against the token endpoint and exit
    #[arg(long)]
    check_auth: bool,

    /// Mirror log output into this file (truncated at startup)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(format!("drive_photo_frame={level}").parse()?)
        .add_directive("wgpu=warn".parse()?)
        .add_directive("winit=warn".parse()?);

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_file.as_deref())?;

    let cfg = match &cli.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    }
    .validated()
    .context("invalid configuration values")?;
    info!(
        auth_dir = %cfg.auth_dir.display(),
        display = %humantime::format_duration(cfg.display_duration),
        retry_delay = %humantime::format_duration(cfg.retry_delay),
        max_connection_attempts = cfg.max_connection_attempts,
        "configuration loaded"
    );

    let store = FileCredentialStore::from_config(&cfg);
    let credentials = store
        .credentials()
        .context("error during initialization")?;
    let token = store.token().context("error during initialization")?;
    let service: Arc<dyn RemotePhotoService> = Arc::new(
        DriveService::new(&cfg.api_base_url, cfg.request_timeout)
            .context("error during initialization")?,
    );

    if cli.check_auth {
        return check_auth(service.as_ref(), &credentials, &token).await;
    }

    let folder_id = store.folder_id().context("error during initialization")?;
    let tokens = Arc::new(match store.token_path() {
        Some(path) => TokenStore::persistent(token, path),
        None => TokenStore::in_memory(token),
    });
    let client = Arc::new(AuthenticatedClient::new(service, credentials, tokens));
    let catalog = PhotoCatalog::new(client.clone(), cfg.page_size, cfg.retry_delay);
    let rotation = Rotation::from_degrees(cfg.rotate_degrees)
        .ok_or_else(|| anyhow!("unsupported rotate-degrees {}", cfg.rotate_degrees))?;
    let processor = ImageProcessor::new(rotation);

    // one frame in flight keeps the show strictly sequential
    let (frame_tx, frame_rx) = mpsc::channel::<DisplayFrame>(1);
    let (size_tx, size_rx) = oneshot::channel::<(u32, u32)>();
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let slideshow = tokio::spawn({
        let cancel = cancel.clone();
        let timing = SlideshowTiming::from(&cfg);
        let retry = RetryState::new(cfg.max_connection_attempts);
        let seed = cfg.shuffle_seed;
        async move {
            let Ok(size) = size_rx.await else {
                info!("viewer closed before the display surface was ready");
                return Ok(());
            };
            let sink = ChannelSink::new(size, frame_tx);
            let controller = SlideshowController::new(
                folder_id, catalog, client, processor, sink, timing, retry, seed,
            );
            let result = controller.run(cancel.clone()).await;
            cancel.cancel();
            result
        }
    });

    // The window must live on the main thread; this returns on close or cancellation.
    let viewer_result = viewer::run_windowed(frame_rx, size_tx, cancel.clone(), cfg.fullscreen)
        .context("viewer failed");
    cancel.cancel();
    let slideshow_result = slideshow.await;

    viewer_result?;
    match slideshow_result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err).context("slideshow halted"),
        Err(err) => Err(anyhow!("slideshow task failed: {err}")),
    }
}

async fn check_auth(
    service: &dyn RemotePhotoService,
    credentials: &Credentials,
    token: &Token,
) -> Result<()> {
    let valid = check_refresh_token(service, credentials, token)
        .await
        .context("error checking refresh token")?;
    if valid {
        info!("refresh token is valid");
        Ok(())
    } else {
        error!("refresh token is invalid or expired; re-authorize the application");
        Err(anyhow!("refresh token is not valid"))
    }
}
