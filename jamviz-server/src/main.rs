//! JamViz server - main entry point
//!
//! Wires capture, analysis, broadcast, detection sources, enrichment and the
//! HTTP listeners together on a single-threaded runtime.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jamviz_common::config::{resolve_data_folder, TomlConfig};
use jamviz_server::api::{self, AppState};
use jamviz_server::audio::{run_capture, CaptureSource, FingerprintBuffer, PipeCapture, SpectralFrameBuilder};
use jamviz_server::broadcast::spawn_hub;
use jamviz_server::coordinator::{CycleSettings, TrackCoordinator};
use jamviz_server::db::{self, HistoryStore, ProfileStore, VideoCache};
use jamviz_server::enrichment::{ArtistEnricher, EnrichmentCoordinator, EnrichmentTimeouts, VideoLookup};
use jamviz_server::pipeline::run_analysis;
use jamviz_server::reconcile::TrackReconciler;
use jamviz_server::services::acoustid_client::AcoustIdClient;
use jamviz_server::services::video_lookup::THUMBNAIL_DIR;
use jamviz_server::services::{CatalogEnricher, FpcalcIdentifier, YtDlpLookup};
use jamviz_server::sources::{ExtensionInbox, FingerprintSource, MediaSessionSource, WindowTitleSource};

/// Media cache folder inside the data folder, served under `/media`
const MEDIA_CACHE_DIR: &str = "media_cache";

/// Command-line arguments for jamviz-server
#[derive(Parser, Debug)]
#[command(name = "jamviz-server")]
#[command(about = "Real-time audio visualizer with now-playing detection")]
#[command(version)]
struct Args {
    /// Path to jamviz.toml
    #[arg(short, long, env = "JAMVIZ_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "JAMVIZ_PORT")]
    port: Option<u16>,

    /// Folder for the database and media cache
    #[arg(short, long)]
    data_folder: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("jamviz_server={0},jamviz_common={0},tower_http=info", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    runtime.block_on(run(config, args.data_folder))
}

async fn run(config: TomlConfig, data_folder_arg: Option<PathBuf>) -> Result<()> {
    info!(
        "Starting JamViz server v{} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let data_folder = resolve_data_folder(data_folder_arg.as_deref(), &config);
    let media_dir = data_folder.join(MEDIA_CACHE_DIR);
    tokio::fs::create_dir_all(media_dir.join(THUMBNAIL_DIR))
        .await
        .with_context(|| format!("Failed to create {}", media_dir.display()))?;
    info!("Data folder: {}", data_folder.display());

    let pool = db::init_database_pool(&data_folder.join(db::DATABASE_FILE))
        .await
        .context("Failed to open database")?;
    let history = HistoryStore::new(pool.clone(), config.enrichment.history_max_entries);

    // Capture → analysis → hub
    let audio = &config.audio;
    let (block_tx, block_rx) = mpsc::channel(8);
    match open_capture(&config) {
        Ok(source) => {
            tokio::spawn(run_capture(source, block_tx));
        }
        Err(e) => warn!("Audio capture unavailable, frames will not update: {:#}", e),
    }
    let hub = spawn_hub(audio.fps);

    let acoustid_key = config.resolve_acoustid_key();
    let fingerprint_buffer = acoustid_key
        .as_ref()
        .map(|_| FingerprintBuffer::shared(audio.sample_rate, &config.fingerprint));
    if acoustid_key.is_none() {
        info!("No AcoustID key configured, acoustic identification disabled");
    }

    // Enrichment
    let stage_timeout = Duration::from_secs(config.enrichment.timeout_secs);
    let enricher: Arc<dyn ArtistEnricher> = Arc::new(
        CatalogEnricher::new(ProfileStore::new(pool.clone()), stage_timeout)
            .context("Failed to build catalog clients")?,
    );
    let video: Option<Arc<dyn VideoLookup>> = if config.enrichment.video_lookup {
        let lookup = YtDlpLookup::new(
            VideoCache::new(pool.clone()),
            config.enrichment.yt_dlp_path.clone(),
            media_dir.clone(),
            Duration::from_secs(config.enrichment.video_timeout_secs),
        )
        .context("Failed to build video lookup")?;
        let lookup: Arc<dyn VideoLookup> = Arc::new(lookup);
        Some(lookup)
    } else {
        None
    };
    let (enrichment, stage_updates) = EnrichmentCoordinator::new(
        Some(enricher),
        video,
        EnrichmentTimeouts {
            stage: stage_timeout,
            // Lookup plus thumbnail download
            video: Duration::from_secs(config.enrichment.video_timeout_secs + 10),
        },
        format!("{}/media", config.server.public_base_url()),
    );

    // Detection
    let sources = &config.sources;
    let poll_timeout = Duration::from_millis(sources.poll_timeout_ms);
    let inbox = Arc::new(ExtensionInbox::new());
    let mut coordinator = TrackCoordinator::new(
        TrackReconciler::new(sources.priority.clone()),
        enrichment,
        stage_updates,
        Arc::new(history.clone()),
        CycleSettings {
            poll_interval: Duration::from_millis(sources.poll_interval_ms),
            poll_timeout,
        },
    )
    .with_source(inbox.clone());
    if sources.media_session {
        coordinator = coordinator.with_source(Arc::new(MediaSessionSource::new(
            sources.media_session_command.clone(),
            poll_timeout,
        )));
    }
    if sources.window_titles {
        coordinator = coordinator.with_source(Arc::new(WindowTitleSource::new(
            sources.window_title_command.clone(),
            sources.browser_suffix.clone(),
            poll_timeout,
        )));
    }
    if let (Some(key), Some(buffer)) = (acoustid_key, &fingerprint_buffer) {
        let fp = &config.fingerprint;
        let lookup_timeout = Duration::from_secs(fp.timeout_secs);
        let client = AcoustIdClient::new(key, lookup_timeout).context("Failed to build AcoustID client")?;
        let identifier = FpcalcIdentifier::new(fp.fpcalc_path.clone(), client, fp.min_score, lookup_timeout);
        coordinator = coordinator
            .with_source(Arc::new(FingerprintSource::new(
                buffer.clone(),
                Arc::new(identifier),
                lookup_timeout,
            )))
            .with_fingerprint_buffer(buffer.clone());
    }

    tokio::spawn(run_analysis(
        block_rx,
        SpectralFrameBuilder::new(audio.fft_bins, audio.waveform_points),
        fingerprint_buffer,
        coordinator.subscribe(),
        hub.frame_sender(),
    ));
    tokio::spawn(coordinator.run());

    // HTTP
    let app = api::create_router(AppState {
        hub,
        inbox,
        history,
        media_dir,
    });
    // Extension and history clients that expect their own port get the same routes
    let server = &config.server;
    let primary = serve_on(&server.host, server.port, app.clone());
    match server.ingest_port().filter(|port| *port != server.port) {
        Some(ingest_port) => {
            tokio::try_join!(primary, serve_on(&server.host, ingest_port, app))?;
        }
        None => primary.await?,
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Bind `host:port` and serve until the shutdown signal
async fn serve_on(host: &str, port: u16, app: Router) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

/// Input device when configured (and compiled in), otherwise the capture command
fn open_capture(config: &TomlConfig) -> Result<Box<dyn CaptureSource>> {
    let audio = &config.audio;
    if audio.use_input_device {
        #[cfg(feature = "cpal")]
        {
            let capture = jamviz_server::audio::capture::CpalCapture::open(audio.block_size)
                .context("Failed to open input device")?;
            return Ok(Box::new(capture));
        }
        #[cfg(not(feature = "cpal"))]
        warn!("Built without the cpal feature, falling back to the capture command");
    }

    let capture = PipeCapture::new(&audio.capture_command, audio.sample_rate, audio.block_size)
        .with_context(|| format!("Invalid capture command {:?}", audio.capture_command))?;
    Ok(Box::new(capture))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
