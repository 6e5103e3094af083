//! Video lookup cache keyed by lowercased `artist|||title`

use crate::error::Result;
use chrono::Utc;
use jamviz_common::models::VideoInfo;
use sqlx::{Row, SqlitePool};

#[derive(Clone)]
pub struct VideoCache {
    pool: SqlitePool,
}

/// Cache key: trimmed, lowercased `artist|||title`
pub fn cache_key(artist: &str, title: &str) -> String {
    format!(
        "{}|||{}",
        artist.trim().to_lowercase(),
        title.trim().to_lowercase()
    )
}

impl VideoCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, artist: &str, title: &str) -> Result<Option<VideoInfo>> {
        let row = sqlx::query(
            r#"
            SELECT video_id, video_title, channel, duration, thumbnail_url, video_url, local_thumbnail
            FROM video_cache
            WHERE cache_key = ?
            "#,
        )
        .bind(cache_key(artist, title))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| VideoInfo {
            video_id: row.get("video_id"),
            video_title: row.get("video_title"),
            channel: row.get("channel"),
            duration: row.get("duration"),
            thumbnail_url: row.get("thumbnail_url"),
            video_url: row.get("video_url"),
            local_thumbnail: row.get("local_thumbnail"),
        }))
    }

    pub async fn put(&self, artist: &str, title: &str, info: &VideoInfo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO video_cache (
                cache_key, video_id, video_title, channel, duration,
                thumbnail_url, video_url, local_thumbnail, cached_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                video_id = excluded.video_id,
                video_title = excluded.video_title,
                channel = excluded.channel,
                duration = excluded.duration,
                thumbnail_url = excluded.thumbnail_url,
                video_url = excluded.video_url,
                local_thumbnail = excluded.local_thumbnail,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(cache_key(artist, title))
        .bind(&info.video_id)
        .bind(&info.video_title)
        .bind(&info.channel)
        .bind(info.duration)
        .bind(&info.thumbnail_url)
        .bind(&info.video_url)
        .bind(&info.local_thumbnail)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;

    fn info(id: &str) -> VideoInfo {
        VideoInfo {
            video_id: id.to_string(),
            video_title: "Queen - Bohemian Rhapsody (Official Video)".to_string(),
            channel: "Queen Official".to_string(),
            duration: 359.0,
            thumbnail_url: format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", id),
            video_url: format!("https://www.youtube.com/watch?v={}", id),
            local_thumbnail: Some(format!("thumbnails/{}.jpg", id)),
        }
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key(" Queen ", "Bohemian Rhapsody"), "queen|||bohemian rhapsody");
    }

    #[tokio::test]
    async fn test_put_get_case_insensitive() {
        let cache = VideoCache::new(init_memory_pool().await.unwrap());
        assert!(cache.get("Queen", "Bohemian Rhapsody").await.unwrap().is_none());

        cache.put("Queen", "Bohemian Rhapsody", &info("fJ9rUzIMcZQ")).await.unwrap();
        let cached = cache.get("QUEEN", "bohemian rhapsody").await.unwrap().unwrap();
        assert_eq!(cached, info("fJ9rUzIMcZQ"));

        // Overwrite keeps one row per key
        cache.put("queen", "bohemian rhapsody", &info("other")).await.unwrap();
        assert_eq!(
            cache.get("Queen", "Bohemian Rhapsody").await.unwrap().unwrap().video_id,
            "other"
        );
    }
}
