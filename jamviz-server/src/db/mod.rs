//! SQLite persistence
//!
//! One database file in the data folder holds play history, artist profiles
//! and the video lookup cache.

pub mod artist_profiles;
pub mod history;
pub mod video_cache;

pub use artist_profiles::ProfileStore;
pub use history::{HistorySink, HistoryStore};
pub use video_cache::VideoCache;

use crate::error::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Database file name inside the data folder
pub const DATABASE_FILE: &str = "jamviz.db";

/// Open (creating if needed) the database and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database with all tables
pub async fn init_memory_pool() -> Result<SqlitePool> {
    // Every connection to :memory: is a separate database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create tables that do not exist yet
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            artist TEXT NOT NULL,
            title TEXT NOT NULL,
            album TEXT NOT NULL DEFAULT '',
            source TEXT NOT NULL,
            played_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artist_profiles (
            slug TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            images TEXT,
            dominant_colors TEXT,
            genres TEXT,
            mood_tags TEXT,
            preferred_visualizer TEXT,
            songs TEXT NOT NULL DEFAULT '[]',
            last_updated TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS video_cache (
            cache_key TEXT PRIMARY KEY,
            video_id TEXT NOT NULL,
            video_title TEXT NOT NULL,
            channel TEXT NOT NULL DEFAULT '',
            duration REAL NOT NULL DEFAULT 0,
            thumbnail_url TEXT NOT NULL,
            video_url TEXT NOT NULL,
            local_thumbnail TEXT,
            cached_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (history, artist_profiles, video_cache)");
    Ok(())
}
