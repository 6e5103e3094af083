//! Unit tests for configuration loading and graceful degradation
//!
//! Covers:
//! - Missing TOML files do not prevent startup (defaults apply)
//! - Partial TOML files fill the rest from defaults
//! - Validation of degenerate settings
//! - Data folder and AcoustID key resolution priority
//!
//! Note: Uses serial_test to prevent ENV variable race conditions.

use jamviz_common::config::{
    resolve_data_folder, TomlConfig, ACOUSTID_KEY_ENV, DATA_FOLDER_ENV,
};
use jamviz_common::SourceKind;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

#[test]
fn test_defaults_match_capture_pipeline() {
    let config = TomlConfig::default();

    assert_eq!(config.audio.sample_rate, 44100);
    assert_eq!(config.audio.block_size, 2048);
    assert_eq!(config.audio.fft_bins, 128);
    assert_eq!(config.audio.waveform_points, 128);
    assert_eq!(config.audio.fps, 30);
    assert_eq!(config.fingerprint.buffer_seconds, 20.0);
    assert_eq!(config.fingerprint.query_cooldown_secs, 12.0);
    assert_eq!(config.sources.priority, SourceKind::DEFAULT_PRIORITY.to_vec());
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_file_uses_defaults() {
    let config = TomlConfig::load_or_default(Some(Path::new("/nonexistent/jamviz.toml")))
        .expect("missing file must not be fatal");
    assert_eq!(config.server.port, 8765);
    assert_eq!(config.server.ingest_port(), Some(8766));
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let file = write_config(
        r#"
        [server]
        port = 9000

        [audio]
        fft_bins = 64

        [sources]
        priority = ["extension", "media_session", "window_title", "fingerprint"]
        "#,
    );

    let config = TomlConfig::load(file.path()).expect("valid config");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.audio.fft_bins, 64);
    assert_eq!(config.audio.block_size, 2048);
    assert_eq!(config.sources.priority[0], SourceKind::Extension);
    assert_eq!(config.sources.priority[2], SourceKind::WindowTitle);
}

#[test]
fn test_malformed_file_is_error() {
    let file = write_config("[audio\nfps = ");
    assert!(TomlConfig::load(file.path()).is_err());
}

#[test]
fn test_validation_rejects_duplicate_priority() {
    let mut config = TomlConfig::default();
    config.sources.priority = vec![
        SourceKind::MediaSession,
        SourceKind::MediaSession,
        SourceKind::WindowTitle,
        SourceKind::Fingerprint,
    ];
    assert!(config.validate().is_err());

    config.sources.priority = vec![SourceKind::MediaSession];
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_zero_sizes() {
    let mut config = TomlConfig::default();
    config.audio.fft_bins = 0;
    assert!(config.validate().is_err());

    let mut config = TomlConfig::default();
    config.audio.fps = 0;
    assert!(config.validate().is_err());

    let mut config = TomlConfig::default();
    config.fingerprint.min_query_seconds = 30.0;
    assert!(config.validate().is_err());
}

#[test]
fn test_ingest_listener_optional() {
    let file = write_config("[server]\ningest_port = 0\n");
    let config = TomlConfig::load(file.path()).expect("valid config");
    assert_eq!(config.server.ingest_port(), None);
    assert!(config.validate().is_ok());

    let mut config = TomlConfig::default();
    config.server.ingest_port = config.server.port;
    assert!(config.validate().is_err());
}

#[test]
fn test_public_base_url() {
    let mut config = TomlConfig::default();
    assert_eq!(config.server.public_base_url(), "http://127.0.0.1:8765");

    config.server.public_url = Some("http://viz.local:8080/".to_string());
    assert_eq!(config.server.public_base_url(), "http://viz.local:8080");
}

#[test]
#[serial]
fn test_data_folder_priority() {
    let mut toml = TomlConfig::default();
    toml.data_folder = Some(PathBuf::from("/tmp/jamviz-toml"));

    env::set_var(DATA_FOLDER_ENV, "/tmp/jamviz-env");
    assert_eq!(
        resolve_data_folder(Some(Path::new("/tmp/jamviz-cli")), &toml),
        PathBuf::from("/tmp/jamviz-cli")
    );
    assert_eq!(resolve_data_folder(None, &toml), PathBuf::from("/tmp/jamviz-env"));

    env::remove_var(DATA_FOLDER_ENV);
    assert_eq!(resolve_data_folder(None, &toml), PathBuf::from("/tmp/jamviz-toml"));

    toml.data_folder = None;
    assert!(!resolve_data_folder(None, &toml).as_os_str().is_empty());
}

#[test]
#[serial]
fn test_acoustid_key_priority() {
    let mut toml = TomlConfig::default();
    toml.acoustid_api_key = Some("toml-key".to_string());

    env::set_var(ACOUSTID_KEY_ENV, "env-key");
    assert_eq!(toml.resolve_acoustid_key().as_deref(), Some("env-key"));

    env::set_var(ACOUSTID_KEY_ENV, "   ");
    assert_eq!(toml.resolve_acoustid_key().as_deref(), Some("toml-key"));

    env::remove_var(ACOUSTID_KEY_ENV);
    toml.acoustid_api_key = None;
    assert!(toml.resolve_acoustid_key().is_none());
}
