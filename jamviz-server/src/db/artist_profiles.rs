//! Artist profile persistence
//!
//! List-valued fields are stored as JSON text. A column that fails to parse is
//! read back as "not yet known" so the next enrichment refills it.

use crate::error::Result;
use chrono::{DateTime, Utc};
use jamviz_common::models::{ArtistProfile, SongRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::warn;

#[derive(Clone)]
pub struct ProfileStore {
    pool: SqlitePool,
}

fn decode_column<T: DeserializeOwned>(row: &SqliteRow, column: &str, slug: &str) -> Option<T> {
    let raw: Option<String> = row.get(column);
    let raw = raw?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(slug = %slug, column, "Discarding malformed profile column: {}", e);
            None
        }
    }
}

fn encode_column<T: Serialize>(value: &Option<T>) -> Result<Option<String>> {
    Ok(match value {
        Some(v) => Some(serde_json::to_string(v)?),
        None => None,
    })
}

impl ProfileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stored profile for `artist`, if any
    pub async fn load(&self, artist: &str) -> Result<Option<ArtistProfile>> {
        let slug = ArtistProfile::slugify(artist);
        let row = sqlx::query(
            r#"
            SELECT slug, name, images, dominant_colors, genres, mood_tags,
                   preferred_visualizer, songs, last_updated
            FROM artist_profiles
            WHERE slug = ?
            "#,
        )
        .bind(&slug)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let songs: Vec<SongRecord> = decode_column(&row, "songs", &slug).unwrap_or_default();
        let last_updated: Option<String> = row.get("last_updated");

        Ok(Some(ArtistProfile {
            name: row.get("name"),
            slug: row.get("slug"),
            images: decode_column(&row, "images", &slug),
            dominant_colors: decode_column(&row, "dominant_colors", &slug),
            genres: decode_column(&row, "genres", &slug),
            mood_tags: decode_column(&row, "mood_tags", &slug),
            preferred_visualizer: row
                .get::<Option<String>, _>("preferred_visualizer")
                .filter(|v| !v.is_empty()),
            songs,
            last_updated: last_updated
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        }))
    }

    /// Stored profile or a fresh skeleton (not saved)
    pub async fn get_or_create(&self, artist: &str) -> Result<ArtistProfile> {
        Ok(self
            .load(artist)
            .await?
            .unwrap_or_else(|| ArtistProfile::new(artist)))
    }

    /// Insert or replace; stamps `last_updated`
    pub async fn save(&self, profile: &mut ArtistProfile) -> Result<()> {
        profile.last_updated = Some(Utc::now());

        let images = encode_column(&profile.images)?;
        let colors = encode_column(&profile.dominant_colors)?;
        let genres = encode_column(&profile.genres)?;
        let moods = encode_column(&profile.mood_tags)?;
        let songs = serde_json::to_string(&profile.songs)?;
        let last_updated = profile.last_updated.map(|dt| dt.to_rfc3339());

        sqlx::query(
            r#"
            INSERT INTO artist_profiles (
                slug, name, images, dominant_colors, genres, mood_tags,
                preferred_visualizer, songs, last_updated
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                name = excluded.name,
                images = excluded.images,
                dominant_colors = excluded.dominant_colors,
                genres = excluded.genres,
                mood_tags = excluded.mood_tags,
                preferred_visualizer = excluded.preferred_visualizer,
                songs = excluded.songs,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&profile.slug)
        .bind(&profile.name)
        .bind(images)
        .bind(colors)
        .bind(genres)
        .bind(moods)
        .bind(&profile.preferred_visualizer)
        .bind(songs)
        .bind(last_updated)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Add a song to the artist's profile unless already listed
    pub async fn update_song(
        &self,
        artist: &str,
        title: &str,
        album: &str,
        musicbrainz_id: Option<String>,
    ) -> Result<ArtistProfile> {
        let mut profile = self.get_or_create(artist).await?;
        if profile.add_song(title, album, musicbrainz_id) {
            self.save(&mut profile).await?;
        }
        Ok(profile)
    }
}
