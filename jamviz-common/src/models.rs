//! Now-playing data model
//!
//! Records shared between the detection sources, the reconciler, the enrichment
//! stages and the frame wire format. Field names on the wire are camelCase because
//! the browser frontend reads them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin of a track detection
///
/// Variant order is the default priority order (highest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Desktop media-session metadata (MPRIS player)
    MediaSession,
    /// Track pushed by the browser extension
    Extension,
    /// Parsed from a browser window title
    #[serde(rename = "chrome_tab", alias = "window_title")]
    WindowTitle,
    /// Acoustic fingerprint lookup
    Fingerprint,
}

impl SourceKind {
    /// All kinds in default priority order
    pub const DEFAULT_PRIORITY: [SourceKind; 4] = [
        SourceKind::MediaSession,
        SourceKind::Extension,
        SourceKind::WindowTitle,
        SourceKind::Fingerprint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::MediaSession => "media_session",
            SourceKind::Extension => "extension",
            SourceKind::WindowTitle => "chrome_tab",
            SourceKind::Fingerprint => "fingerprint",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "media_session" => Some(SourceKind::MediaSession),
            "extension" => Some(SourceKind::Extension),
            "chrome_tab" | "window_title" => Some(SourceKind::WindowTitle),
            "fingerprint" => Some(SourceKind::Fingerprint),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized track identity used for change detection
///
/// Two candidates with the same key are the same logical track regardless of
/// which source produced them. Normalization trims, collapses inner whitespace
/// and lowercases both parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TrackKey {
    artist: String,
    title: String,
}

impl TrackKey {
    pub fn new(artist: &str, title: &str) -> Self {
        Self {
            artist: normalize(artist),
            title: normalize(title),
        }
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// True when neither artist nor title is known
    pub fn is_empty(&self) -> bool {
        self.artist.is_empty() && self.title.is_empty()
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|||{}", self.artist, self.title)
    }
}

fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A single detection proposed by one source in one poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackCandidate {
    pub artist: String,
    pub title: String,
    pub album: String,
    /// Artwork as URL or data URI, when the source has it directly
    pub thumbnail: Option<String>,
    pub source: SourceKind,
    pub timestamp: DateTime<Utc>,
    /// MusicBrainz recording ID (fingerprint matches only)
    pub recording_id: Option<String>,
}

impl TrackCandidate {
    pub fn new(artist: impl Into<String>, title: impl Into<String>, source: SourceKind) -> Self {
        Self {
            artist: artist.into().trim().to_string(),
            title: title.into().trim().to_string(),
            album: String::new(),
            thumbnail: None,
            source,
            timestamp: Utc::now(),
            recording_id: None,
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = album.into().trim().to_string();
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_recording_id(mut self, recording_id: Option<String>) -> Self {
        self.recording_id = recording_id.filter(|id| !id.is_empty());
        self
    }

    pub fn key(&self) -> TrackKey {
        TrackKey::new(&self.artist, &self.title)
    }

    /// A candidate with neither artist nor title carries no information
    pub fn is_empty(&self) -> bool {
        self.artist.is_empty() && self.title.is_empty()
    }
}

/// RGB triple, serialized as `[r, g, b]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub [u8; 3]);

/// The canonical "now playing" state
///
/// Exactly one exists at a time. It is replaced wholesale on every change; the
/// two version counters let consumers detect a change without comparing fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSnapshot {
    pub artist: String,
    pub title: String,
    pub album: String,
    pub album_art: Option<String>,
    pub artist_images: Vec<String>,
    pub dominant_colors: Vec<Rgb>,
    pub genres: Vec<String>,
    pub mood_tags: Vec<String>,
    pub preferred_visualizer: String,
    pub detection_source: Option<SourceKind>,
    #[serde(rename = "_profileVersion")]
    pub profile_version: u64,
    #[serde(rename = "_historyVersion")]
    pub history_version: u64,
    pub youtube_video_id: String,
    pub youtube_title: String,
    pub youtube_url: String,
    pub youtube_thumbnail_url: String,
    pub youtube_duration: f64,
}

impl MediaSnapshot {
    /// Stage-one snapshot for a newly accepted track
    ///
    /// Identity and directly available artwork only; every enrichment field
    /// starts empty.
    pub fn for_track(candidate: &TrackCandidate, profile_version: u64, history_version: u64) -> Self {
        Self {
            artist: candidate.artist.clone(),
            title: candidate.title.clone(),
            album: candidate.album.clone(),
            album_art: candidate.thumbnail.clone(),
            detection_source: Some(candidate.source),
            profile_version,
            history_version,
            ..Self::default()
        }
    }

    pub fn has_identity(&self) -> bool {
        !self.artist.is_empty() || !self.title.is_empty()
    }

    pub fn track_key(&self) -> TrackKey {
        TrackKey::new(&self.artist, &self.title)
    }
}

/// Song seen for an artist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRecord {
    pub title: String,
    pub album: String,
    pub musicbrainz_id: Option<String>,
}

/// Persisted artist profile
///
/// `None` means "not yet known"; enrichment stages only run for missing fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistProfile {
    pub name: String,
    pub slug: String,
    pub images: Option<Vec<String>>,
    pub dominant_colors: Option<Vec<Rgb>>,
    pub genres: Option<Vec<String>>,
    pub mood_tags: Option<Vec<String>>,
    pub preferred_visualizer: Option<String>,
    pub songs: Vec<SongRecord>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ArtistProfile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            slug: Self::slugify(name),
            ..Self::default()
        }
    }

    /// Filesystem and key safe slug: lowercase alphanumerics joined by `-`
    pub fn slugify(name: &str) -> String {
        let mut slug = String::with_capacity(name.len());
        let mut pending_dash = false;
        for ch in name.trim().to_lowercase().chars() {
            if ch.is_ascii_alphanumeric() {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(ch);
            } else {
                pending_dash = true;
            }
        }
        if slug.is_empty() {
            "unknown".to_string()
        } else {
            slug
        }
    }

    pub fn has_images(&self) -> bool {
        self.images.as_ref().is_some_and(|i| !i.is_empty())
    }

    pub fn has_genres(&self) -> bool {
        self.genres.as_ref().is_some_and(|g| !g.is_empty())
    }

    pub fn has_colors(&self) -> bool {
        self.dominant_colors.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Missing genres, or images without extracted colors
    pub fn needs_enrichment(&self) -> bool {
        !self.has_genres() || (self.has_images() && !self.has_colors())
    }

    /// Record a song; returns false if a song with the same title (case-insensitive) exists
    pub fn add_song(&mut self, title: &str, album: &str, musicbrainz_id: Option<String>) -> bool {
        if self
            .songs
            .iter()
            .any(|s| s.title.to_lowercase() == title.to_lowercase())
        {
            return false;
        }
        self.songs.push(SongRecord {
            title: title.to_string(),
            album: album.to_string(),
            musicbrainz_id,
        });
        true
    }
}

/// Cached video lookup result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub video_id: String,
    pub video_title: String,
    pub channel: String,
    pub duration: f64,
    pub thumbnail_url: String,
    pub video_url: String,
    pub local_thumbnail: Option<String>,
}

/// One row of play history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub artist: String,
    pub title: String,
    pub album: String,
    pub source: SourceKind,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_key_normalization() {
        let a = TrackKey::new("  Queen ", "Bohemian   Rhapsody");
        let b = TrackKey::new("queen", "bohemian rhapsody");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "queen|||bohemian rhapsody");
    }

    #[test]
    fn test_track_key_empty() {
        assert!(TrackKey::new(" ", "").is_empty());
        assert!(!TrackKey::new("", "Song").is_empty());
    }

    #[test]
    fn test_source_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&SourceKind::WindowTitle).unwrap(),
            "\"chrome_tab\""
        );
        let parsed: SourceKind = serde_json::from_str("\"window_title\"").unwrap();
        assert_eq!(parsed, SourceKind::WindowTitle);
        assert_eq!(SourceKind::parse("media_session"), Some(SourceKind::MediaSession));
        assert_eq!(SourceKind::parse("radio"), None);
    }

    #[test]
    fn test_snapshot_wire_names() {
        let candidate = TrackCandidate::new("Queen", "Bohemian Rhapsody", SourceKind::Extension)
            .with_album("A Night at the Opera");
        let snapshot = MediaSnapshot::for_track(&candidate, 3, 2);
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["artist"], "Queen");
        assert_eq!(json["albumArt"], serde_json::Value::Null);
        assert_eq!(json["detectionSource"], "extension");
        assert_eq!(json["_profileVersion"], 3);
        assert_eq!(json["_historyVersion"], 2);
        assert_eq!(json["youtubeVideoId"], "");
        assert!(json["genres"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_candidate_trims_and_filters() {
        let candidate = TrackCandidate::new(" Artist ", " Title ", SourceKind::MediaSession)
            .with_thumbnail(Some("  ".to_string()))
            .with_recording_id(Some(String::new()));
        assert_eq!(candidate.artist, "Artist");
        assert_eq!(candidate.title, "Title");
        assert!(candidate.thumbnail.is_none());
        assert!(candidate.recording_id.is_none());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(ArtistProfile::slugify("AC/DC"), "ac-dc");
        assert_eq!(ArtistProfile::slugify("  Sigur Rós "), "sigur-r-s");
        assert_eq!(ArtistProfile::slugify("!!!"), "unknown");
    }

    #[test]
    fn test_profile_add_song_dedup() {
        let mut profile = ArtistProfile::new("Queen");
        assert!(profile.add_song("Bohemian Rhapsody", "", None));
        assert!(!profile.add_song("bohemian rhapsody", "Live", None));
        assert_eq!(profile.songs.len(), 1);
    }

    #[test]
    fn test_profile_needs_enrichment() {
        let mut profile = ArtistProfile::new("Queen");
        assert!(profile.needs_enrichment());

        profile.genres = Some(vec!["rock".to_string()]);
        assert!(!profile.needs_enrichment());

        profile.images = Some(vec!["http://img".to_string()]);
        assert!(profile.needs_enrichment());

        profile.dominant_colors = Some(vec![Rgb([1, 2, 3])]);
        assert!(!profile.needs_enrichment());
    }
}
