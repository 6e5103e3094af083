//! Bootstrap configuration and data folder resolution
//!
//! All settings are read once at startup and never change while running.
//! A missing config file is not an error: every section has built-in defaults.

use crate::models::SourceKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the data folder
pub const DATA_FOLDER_ENV: &str = "JAMVIZ_DATA_FOLDER";

/// Environment variable holding the AcoustID client key
pub const ACOUSTID_KEY_ENV: &str = "ACOUSTID_API_KEY";

/// Top-level TOML configuration (`jamviz.toml`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Folder for the SQLite database and media cache
    pub data_folder: Option<PathBuf>,
    /// AcoustID client key; fingerprinting is disabled without one
    pub acoustid_api_key: Option<String>,
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub fingerprint: FingerprintConfig,
    pub sources: SourcesConfig,
    pub enrichment: EnrichmentConfig,
    pub logging: LoggingConfig,
}

/// HTTP/WebSocket listener
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Second listener for clients that post tracks and read history on
    /// their own port; 0 serves everything on `port` only
    pub ingest_port: u16,
    /// Base URL clients use to reach this server (thumbnail links)
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            ingest_port: 8766,
            public_url: None,
        }
    }
}

impl ServerConfig {
    pub fn ingest_port(&self) -> Option<u16> {
        (self.ingest_port != 0).then_some(self.ingest_port)
    }

    pub fn public_base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

/// Capture and spectrum settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Samples per capture block
    pub block_size: usize,
    /// Spectrum buckets per frame
    pub fft_bins: usize,
    /// Waveform points per frame
    pub waveform_points: usize,
    /// Frames pushed to subscribers per second
    pub fps: u32,
    /// Command emitting raw f32le mono PCM on stdout; `{rate}` is substituted
    pub capture_command: Vec<String>,
    /// Use the cpal input device instead of the capture command
    pub use_input_device: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 2048,
            fft_bins: 128,
            waveform_points: 128,
            fps: 30,
            capture_command: vec![
                "parec".to_string(),
                "--device=@DEFAULT_MONITOR@".to_string(),
                "--format=float32le".to_string(),
                "--channels=1".to_string(),
                "--rate={rate}".to_string(),
                "--raw".to_string(),
            ],
            use_input_device: false,
        }
    }
}

/// Fingerprint buffer and identification throttle
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Circular buffer length in seconds
    pub buffer_seconds: f64,
    /// Audio that must be buffered before a query is allowed
    pub min_query_seconds: f64,
    /// Minimum time between identification attempts
    pub query_cooldown_secs: f64,
    /// Snapshots shorter than this are never sent for identification
    pub min_identify_seconds: f64,
    /// Lowest AcoustID score accepted as a match
    pub min_score: f64,
    pub fpcalc_path: String,
    pub timeout_secs: u64,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: 20.0,
            min_query_seconds: 10.0,
            query_cooldown_secs: 12.0,
            min_identify_seconds: 3.0,
            min_score: 0.5,
            fpcalc_path: "fpcalc".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Detection sources and reconciliation cadence
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Reconciliation cycle period
    pub poll_interval_ms: u64,
    /// Per-source poll timeout
    pub poll_timeout_ms: u64,
    /// Highest priority first; must list every source exactly once
    pub priority: Vec<SourceKind>,
    pub media_session: bool,
    pub media_session_command: Vec<String>,
    pub window_titles: bool,
    /// Command printing one window title per line
    pub window_title_command: Vec<String>,
    /// Browser suffix stripped from window titles before parsing
    pub browser_suffix: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            poll_timeout_ms: 3000,
            priority: SourceKind::DEFAULT_PRIORITY.to_vec(),
            media_session: true,
            media_session_command: vec!["playerctl".to_string()],
            window_titles: true,
            window_title_command: vec![
                "xdotool".to_string(),
                "search".to_string(),
                "--onlyvisible".to_string(),
                "--class".to_string(),
                "chrome".to_string(),
                "getwindowname".to_string(),
                "%@".to_string(),
            ],
            browser_suffix: " - Google Chrome".to_string(),
        }
    }
}

/// Enrichment collaborators
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Timeout for each catalog request
    pub timeout_secs: u64,
    pub video_lookup: bool,
    pub yt_dlp_path: String,
    pub video_timeout_secs: u64,
    /// Rows kept in play history
    pub history_max_entries: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            video_lookup: true,
            yt_dlp_path: "yt-dlp".to_string(),
            video_timeout_secs: 15,
            history_max_entries: 1000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config file if present, otherwise fall back to defaults
    ///
    /// A missing file only logs a warning. A file that exists but fails to parse
    /// or validate is still an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };

        match path {
            Some(p) if p.exists() => {
                info!("Loading configuration from {}", p.display());
                Self::load(&p)
            }
            Some(p) => {
                warn!("Config file {} not found, using defaults", p.display());
                Ok(Self::default())
            }
            None => {
                info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject settings that would make the pipeline degenerate
    pub fn validate(&self) -> Result<()> {
        if self.server.ingest_port() == Some(self.server.port) {
            return Err(Error::Config(format!(
                "server.ingest_port must differ from server.port ({})",
                self.server.port
            )));
        }

        let audio = &self.audio;
        if audio.sample_rate == 0 || audio.block_size == 0 {
            return Err(Error::Config(
                "audio.sample_rate and audio.block_size must be positive".to_string(),
            ));
        }
        if audio.fft_bins == 0 || audio.waveform_points == 0 {
            return Err(Error::Config(
                "audio.fft_bins and audio.waveform_points must be positive".to_string(),
            ));
        }
        if audio.fps == 0 {
            return Err(Error::Config("audio.fps must be positive".to_string()));
        }
        if !audio.use_input_device && audio.capture_command.is_empty() {
            return Err(Error::Config("audio.capture_command is empty".to_string()));
        }

        let fp = &self.fingerprint;
        if fp.buffer_seconds <= 0.0 || fp.min_query_seconds > fp.buffer_seconds {
            return Err(Error::Config(format!(
                "fingerprint.min_query_seconds ({}) must not exceed buffer_seconds ({})",
                fp.min_query_seconds, fp.buffer_seconds
            )));
        }

        let unique: HashSet<_> = self.sources.priority.iter().collect();
        if unique.len() != self.sources.priority.len()
            || unique.len() != SourceKind::DEFAULT_PRIORITY.len()
        {
            return Err(Error::Config(format!(
                "sources.priority must list each source exactly once, got {:?}",
                self.sources.priority
            )));
        }
        if self.sources.poll_interval_ms == 0 {
            return Err(Error::Config("sources.poll_interval_ms must be positive".to_string()));
        }

        Ok(())
    }

    /// AcoustID key: environment first, then TOML
    pub fn resolve_acoustid_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var(ACOUSTID_KEY_ENV) {
            if is_valid_key(&key) {
                info!("AcoustID API key loaded from environment variable");
                return Some(key.trim().to_string());
            }
        }
        match &self.acoustid_api_key {
            Some(key) if is_valid_key(key) => {
                info!("AcoustID API key loaded from TOML config");
                Some(key.trim().to_string())
            }
            _ => None,
        }
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Data folder resolution priority:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default (fallback)
pub fn resolve_data_folder(cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATA_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.data_folder {
        return path.clone();
    }

    default_data_folder()
}

/// Default config file location (`~/.config/jamviz/jamviz.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("jamviz").join("jamviz.toml"))
}

/// OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("jamviz"))
        .unwrap_or_else(|| PathBuf::from("./jamviz_data"))
}
