//! Desktop media-session source (MPRIS via playerctl)

use super::PollTrackSource;
use crate::error::Result;
use crate::process::{run_command, split_command};
use crate::reconcile::parse_tab_title;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use jamviz_common::{SourceKind, TrackCandidate};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Tab-separated fields requested from playerctl
const METADATA_FORMAT: &str = "{{artist}}\t{{title}}\t{{album}}\t{{mpris:artUrl}}";

/// Local artwork larger than this is not inlined
const MAX_INLINE_ART_BYTES: u64 = 5 * 1024 * 1024;

/// Raw fields reported by the active player
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerMetadata {
    pub artist: String,
    pub title: String,
    pub album: String,
    pub art_url: String,
}

/// Parse one line of `playerctl metadata --format` output
pub fn parse_metadata(output: &str) -> Option<PlayerMetadata> {
    let line = output.lines().next()?;
    let mut fields = line.split('\t').map(str::trim);
    let metadata = PlayerMetadata {
        artist: fields.next().unwrap_or_default().to_string(),
        title: fields.next().unwrap_or_default().to_string(),
        album: fields.next().unwrap_or_default().to_string(),
        art_url: fields.next().unwrap_or_default().to_string(),
    };
    if metadata.artist.is_empty() && metadata.title.is_empty() {
        None
    } else {
        Some(metadata)
    }
}

/// Identity from player metadata
///
/// Players that only fill the title (browsers playing a web app) get the
/// combined-title heuristic, without requiring a service suffix.
pub fn resolve_identity(metadata: &PlayerMetadata) -> Option<(String, String)> {
    if !metadata.artist.is_empty() {
        return Some((metadata.artist.clone(), metadata.title.clone()));
    }
    let parsed = parse_tab_title(&metadata.title, false)?;
    Some((parsed.artist, parsed.title))
}

fn image_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// Inline `file://` artwork as a data URI; remote URLs pass through
async fn resolve_artwork(art_url: &str) -> Option<String> {
    if art_url.is_empty() {
        return None;
    }
    let Some(path) = art_url.strip_prefix("file://") else {
        return Some(art_url.to_string());
    };

    let path = Path::new(path);
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() <= MAX_INLINE_ART_BYTES => {}
        Ok(_) => return None,
        Err(e) => {
            debug!("Artwork {} unreadable: {}", path.display(), e);
            return None;
        }
    }
    let bytes = tokio::fs::read(path).await.ok()?;
    Some(format!(
        "data:{};base64,{}",
        image_mime(path),
        general_purpose::STANDARD.encode(bytes)
    ))
}

/// Reads the active player's metadata through playerctl
pub struct MediaSessionSource {
    command: Vec<String>,
    timeout: Duration,
}

impl MediaSessionSource {
    /// `command` is the playerctl invocation (program plus any player selection flags)
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

#[async_trait]
impl PollTrackSource for MediaSessionSource {
    fn kind(&self) -> SourceKind {
        SourceKind::MediaSession
    }

    async fn poll(&self) -> Result<Option<TrackCandidate>> {
        let (program, base_args) = split_command(&self.command)?;
        let mut args = base_args.to_vec();
        args.extend(["metadata".to_string(), "--format".to_string(), METADATA_FORMAT.to_string()]);

        let Some(output) = run_command(program, &args, self.timeout).await? else {
            return Ok(None);
        };
        let Some(metadata) = parse_metadata(&output) else {
            return Ok(None);
        };
        let Some((artist, title)) = resolve_identity(&metadata) else {
            debug!(title = %metadata.title, "Player title filtered out");
            return Ok(None);
        };

        let artwork = resolve_artwork(&metadata.art_url).await;
        Ok(Some(
            TrackCandidate::new(artist, title, SourceKind::MediaSession)
                .with_album(metadata.album)
                .with_thumbnail(artwork),
        ))
    }
}
