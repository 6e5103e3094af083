//! Staged enrichment of the accepted track
//!
//! Stages run on spawned workers and report back as [`StageUpdate`]s tagged
//! with the change counter that started them. Only the coordinator task
//! applies updates, through [`EnrichmentCoordinator::merge`]; an update from a
//! superseded track is dropped there.
//!
//! Order per accepted track:
//! 1. artist profile (persisted) and imagery
//! 2. genres → mood tags → preferred visualizer, concurrently with
//! 3. dominant colors of the first image
//! 4. video lookup, independent of the others

pub mod mood;

use crate::error::{with_timeout, Result};
use async_trait::async_trait;
use jamviz_common::models::{ArtistProfile, Rgb, VideoInfo};
use jamviz_common::{MediaSnapshot, TrackCandidate};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub use mood::{derive_mood_tags, derive_preferred_visualizer};

/// Artist catalog and profile persistence
#[async_trait]
pub trait ArtistEnricher: Send + Sync {
    /// Stored profile, or a fresh one for an unknown artist
    async fn load_profile(&self, artist: &str) -> Result<ArtistProfile>;
    async fn fetch_images(&self, artist: &str) -> Result<Vec<String>>;
    async fn fetch_genres(&self, artist: &str) -> Result<Vec<String>>;
    async fn extract_colors(&self, image_url: &str) -> Result<Vec<Rgb>>;
    async fn save_profile(&self, profile: &mut ArtistProfile) -> Result<()>;
}

/// Music video search with its own caching
#[async_trait]
pub trait VideoLookup: Send + Sync {
    async fn lookup(&self, artist: &str, title: &str) -> Result<Option<VideoInfo>>;
}

/// Result of one enrichment stage
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Images(Vec<String>),
    Genres {
        genres: Vec<String>,
        mood_tags: Vec<String>,
        preferred_visualizer: String,
    },
    Colors(Vec<Rgb>),
    Video(VideoInfo),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Images(_) => "images",
            Stage::Genres { .. } => "genres",
            Stage::Colors(_) => "colors",
            Stage::Video(_) => "video",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageUpdate {
    pub generation: u64,
    pub stage: Stage,
}

/// Timeouts applied to collaborator calls
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentTimeouts {
    pub stage: Duration,
    pub video: Duration,
}

/// Starts enrichment workers and merges their results
pub struct EnrichmentCoordinator {
    enricher: Option<Arc<dyn ArtistEnricher>>,
    video: Option<Arc<dyn VideoLookup>>,
    updates: mpsc::Sender<StageUpdate>,
    current: Arc<AtomicU64>,
    timeouts: EnrichmentTimeouts,
    media_base_url: String,
}

impl EnrichmentCoordinator {
    /// `media_base_url` prefixes locally cached video thumbnails (`.../media`)
    pub fn new(
        enricher: Option<Arc<dyn ArtistEnricher>>,
        video: Option<Arc<dyn VideoLookup>>,
        timeouts: EnrichmentTimeouts,
        media_base_url: String,
    ) -> (Self, mpsc::Receiver<StageUpdate>) {
        let (updates, rx) = mpsc::channel(64);
        let coordinator = Self {
            enricher,
            video,
            updates,
            current: Arc::new(AtomicU64::new(0)),
            timeouts,
            media_base_url: media_base_url.trim_end_matches('/').to_string(),
        };
        (coordinator, rx)
    }

    /// Launch every stage for a newly accepted track
    pub fn start(&self, generation: u64, candidate: &TrackCandidate) {
        self.current.store(generation, Ordering::SeqCst);

        if let Some(enricher) = &self.enricher {
            if !candidate.artist.is_empty() {
                let worker = ArtistWorker {
                    enricher: Arc::clone(enricher),
                    updates: self.updates.clone(),
                    current: Arc::clone(&self.current),
                    generation,
                    timeout: self.timeouts.stage,
                };
                let candidate = candidate.clone();
                tokio::spawn(async move { worker.run(candidate).await });
            }
        }

        if let Some(video) = &self.video {
            if !candidate.artist.is_empty() && !candidate.title.is_empty() {
                spawn_video_lookup(
                    Arc::clone(video),
                    self.updates.clone(),
                    generation,
                    candidate.artist.clone(),
                    candidate.title.clone(),
                    self.timeouts.video,
                );
            }
        }
    }

    /// Apply `update` to `snapshot` if it belongs to `current_generation`
    ///
    /// Each merge touches only the stage's own fields and bumps
    /// `profile_version`. Returns whether the snapshot changed.
    pub fn merge(&self, snapshot: &mut MediaSnapshot, current_generation: u64, update: StageUpdate) -> bool {
        if update.generation != current_generation {
            debug!(
                stage = update.stage.name(),
                update_generation = update.generation,
                current_generation,
                "Dropping stale enrichment result"
            );
            return false;
        }

        match update.stage {
            Stage::Images(images) => snapshot.artist_images = images,
            Stage::Genres {
                genres,
                mood_tags,
                preferred_visualizer,
            } => {
                snapshot.genres = genres;
                snapshot.mood_tags = mood_tags;
                snapshot.preferred_visualizer = preferred_visualizer;
            }
            Stage::Colors(colors) => snapshot.dominant_colors = colors,
            Stage::Video(video) => {
                snapshot.youtube_thumbnail_url = match &video.local_thumbnail {
                    Some(relative) => format!("{}/{}", self.media_base_url, relative),
                    None => video.thumbnail_url.clone(),
                };
                snapshot.youtube_video_id = video.video_id;
                snapshot.youtube_title = video.video_title;
                snapshot.youtube_url = video.video_url;
                snapshot.youtube_duration = video.duration;
            }
        }
        snapshot.profile_version += 1;
        true
    }
}

/// Supervised fire-and-forget video lookup
///
/// The lookup runs in its own task; a failure or panic there is logged by the
/// supervising task and never reaches the caller.
fn spawn_video_lookup(
    video: Arc<dyn VideoLookup>,
    updates: mpsc::Sender<StageUpdate>,
    generation: u64,
    artist: String,
    title: String,
    timeout: Duration,
) {
    tokio::spawn(async move {
        let lookup = tokio::spawn(async move {
            with_timeout("video lookup", timeout, video.lookup(&artist, &title)).await
        });

        match lookup.await {
            Ok(Ok(Some(info))) => {
                info!(video_id = %info.video_id, "Video found");
                let _ = updates
                    .send(StageUpdate {
                        generation,
                        stage: Stage::Video(info),
                    })
                    .await;
            }
            Ok(Ok(None)) => debug!("No video found"),
            Ok(Err(e)) => warn!("Video lookup failed: {}", e),
            Err(e) => warn!("Video lookup task aborted: {}", e),
        }
    });
}

/// Artist stages for one accepted track
struct ArtistWorker {
    enricher: Arc<dyn ArtistEnricher>,
    updates: mpsc::Sender<StageUpdate>,
    current: Arc<AtomicU64>,
    generation: u64,
    timeout: Duration,
}

impl ArtistWorker {
    fn is_stale(&self) -> bool {
        self.current.load(Ordering::SeqCst) != self.generation
    }

    async fn send(&self, stage: Stage) {
        let _ = self
            .updates
            .send(StageUpdate {
                generation: self.generation,
                stage,
            })
            .await;
    }

    async fn run(self, candidate: TrackCandidate) {
        let artist = candidate.artist.as_str();

        let mut profile = match with_timeout("profile load", self.timeout, self.enricher.load_profile(artist)).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(artist = %artist, "Profile load failed, starting fresh: {}", e);
                ArtistProfile::new(artist)
            }
        };
        let mut changed = profile.last_updated.is_none();

        // Stage 1: imagery, which gates colors
        let images = if profile.has_images() {
            profile.images.clone().unwrap_or_default()
        } else {
            match with_timeout("artist images", self.timeout, self.enricher.fetch_images(artist)).await {
                Ok(images) => {
                    if !images.is_empty() {
                        profile.images = Some(images.clone());
                        changed = true;
                    }
                    images
                }
                Err(e) => {
                    warn!(artist = %artist, "Artist image lookup failed: {}", e);
                    Vec::new()
                }
            }
        };
        if !images.is_empty() {
            self.send(Stage::Images(images.clone())).await;
        }
        if self.is_stale() {
            debug!(artist = %artist, "Track changed, abandoning enrichment");
            return;
        }

        // Stages 2 and 3 run concurrently
        let (genre_stage, colors) = tokio::join!(
            self.genre_stage(artist, &profile),
            self.color_stage(artist, &profile, images.first().cloned()),
        );

        if let Some((genres, moods, visualizer, fetched)) = genre_stage {
            changed |= fetched
                || profile.mood_tags.as_ref() != Some(&moods)
                || profile.preferred_visualizer.as_ref() != Some(&visualizer);
            profile.genres = Some(genres);
            profile.mood_tags = Some(moods);
            profile.preferred_visualizer = Some(visualizer);
        }
        if let Some((colors, fetched)) = colors {
            changed |= fetched;
            profile.dominant_colors = Some(colors);
        }

        if !candidate.title.is_empty() {
            changed |= profile.add_song(&candidate.title, &candidate.album, candidate.recording_id.clone());
        }

        if changed {
            if let Err(e) = with_timeout("profile save", self.timeout, self.enricher.save_profile(&mut profile)).await {
                warn!(artist = %artist, "Profile save failed: {}", e);
            }
        }
    }

    /// Genres (stored or fetched), then locally derived moods and visualizer
    ///
    /// The flag is true when genres were fetched this run.
    async fn genre_stage(
        &self,
        artist: &str,
        profile: &ArtistProfile,
    ) -> Option<(Vec<String>, Vec<String>, String, bool)> {
        let (genres, fetched) = if profile.has_genres() {
            (profile.genres.clone().unwrap_or_default(), false)
        } else {
            match with_timeout("genre lookup", self.timeout, self.enricher.fetch_genres(artist)).await {
                Ok(genres) => (genres, true),
                Err(e) => {
                    warn!(artist = %artist, "Genre lookup failed: {}", e);
                    (Vec::new(), false)
                }
            }
        };
        if genres.is_empty() {
            return None;
        }

        let moods = profile
            .mood_tags
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| derive_mood_tags(&genres));
        let visualizer = profile
            .preferred_visualizer
            .clone()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| derive_preferred_visualizer(&genres));

        self.send(Stage::Genres {
            genres: genres.clone(),
            mood_tags: moods.clone(),
            preferred_visualizer: visualizer.clone(),
        })
        .await;
        info!(artist = %artist, genres = ?genres, visualizer = %visualizer, "Genres resolved");
        Some((genres, moods, visualizer, fetched))
    }

    /// Colors (stored or extracted from the first image)
    async fn color_stage(
        &self,
        artist: &str,
        profile: &ArtistProfile,
        first_image: Option<String>,
    ) -> Option<(Vec<Rgb>, bool)> {
        let (colors, fetched) = if profile.has_colors() {
            (profile.dominant_colors.clone().unwrap_or_default(), false)
        } else {
            let url = first_image?;
            match with_timeout("color extraction", self.timeout, self.enricher.extract_colors(&url)).await {
                Ok(colors) => (colors, true),
                Err(e) => {
                    warn!(artist = %artist, "Color extraction failed: {}", e);
                    return None;
                }
            }
        };
        if colors.is_empty() {
            return None;
        }
        self.send(Stage::Colors(colors.clone())).await;
        debug!(artist = %artist, count = colors.len(), "Colors resolved");
        Some((colors, fetched))
    }
}
