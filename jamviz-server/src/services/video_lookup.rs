//! Music video lookup through `yt-dlp`
//!
//! Cache first; on a miss the top search result is fetched, its thumbnail saved
//! under `<data>/media_cache/thumbnails/` and the entry cached.

use super::http_client;
use crate::db::VideoCache;
use crate::enrichment::VideoLookup;
use crate::error::{Error, Result};
use crate::process::run_command;
use async_trait::async_trait;
use jamviz_common::models::VideoInfo;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Subdirectory of the media cache holding thumbnails
pub const THUMBNAIL_DIR: &str = "thumbnails";

/// Fields read from `yt-dlp --dump-json`
#[derive(Debug, Clone, Deserialize)]
pub struct YtDlpEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

impl YtDlpEntry {
    pub fn into_video_info(self) -> Option<VideoInfo> {
        if self.id.is_empty() {
            return None;
        }
        Some(VideoInfo {
            thumbnail_url: format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", self.id),
            video_url: format!("https://www.youtube.com/watch?v={}", self.id),
            video_title: self.title,
            channel: self.channel.unwrap_or_default(),
            duration: self.duration.unwrap_or(0.0),
            local_thumbnail: None,
            video_id: self.id,
        })
    }
}

/// `ytsearch1:` query for the official video
pub fn search_query(artist: &str, title: &str) -> String {
    format!("ytsearch1:{} {} official music video", artist, title)
}

pub struct YtDlpLookup {
    cache: VideoCache,
    yt_dlp_path: String,
    media_dir: PathBuf,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl YtDlpLookup {
    /// `media_dir` is the media cache root served under `/media`
    pub fn new(cache: VideoCache, yt_dlp_path: String, media_dir: PathBuf, timeout: Duration) -> Result<Self> {
        Ok(Self {
            cache,
            yt_dlp_path,
            media_dir,
            http_client: http_client(Duration::from_secs(10))?,
            timeout,
        })
    }

    async fn search(&self, artist: &str, title: &str) -> Result<Option<VideoInfo>> {
        let args = vec![
            "--dump-json".to_string(),
            "--no-download".to_string(),
            search_query(artist, title),
        ];
        let Some(stdout) = run_command(&self.yt_dlp_path, &args, self.timeout).await? else {
            return Ok(None);
        };
        let Some(line) = stdout.lines().find(|l| !l.trim().is_empty()) else {
            return Ok(None);
        };
        let entry: YtDlpEntry = serde_json::from_str(line)?;
        Ok(entry.into_video_info())
    }

    /// Save the thumbnail unless already present; returns its media-relative path
    async fn download_thumbnail(&self, info: &VideoInfo) -> Result<String> {
        let relative = format!("{}/{}.jpg", THUMBNAIL_DIR, info.video_id);
        let dest = self.media_dir.join(&relative);
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            return Ok(relative);
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = self
            .http_client
            .get(&info.thumbnail_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tokio::fs::write(&dest, &bytes).await?;
        Ok(relative)
    }
}

#[async_trait]
impl VideoLookup for YtDlpLookup {
    async fn lookup(&self, artist: &str, title: &str) -> Result<Option<VideoInfo>> {
        if artist.is_empty() || title.is_empty() {
            return Err(Error::Internal("video lookup needs artist and title".to_string()));
        }
        if let Some(cached) = self.cache.get(artist, title).await? {
            return Ok(Some(cached));
        }

        let Some(mut video) = self.search(artist, title).await? else {
            return Ok(None);
        };

        match self.download_thumbnail(&video).await {
            Ok(relative) => video.local_thumbnail = Some(relative),
            Err(e) => warn!(video_id = %video.video_id, "Thumbnail download error: {}", e),
        }

        self.cache.put(artist, title, &video).await?;
        info!(video_id = %video.video_id, title = %video.video_title, "Video cached");
        Ok(Some(video))
    }
}
