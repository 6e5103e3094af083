//! Play history
//!
//! Append-only log of accepted tracks, trimmed to the newest `max_entries` rows.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jamviz_common::models::HistoryEntry;
use jamviz_common::SourceKind;
use sqlx::{Row, SqlitePool};
use tracing::warn;

/// Receives one entry per accepted track
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, entry: HistoryEntry) -> Result<()>;
}

#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
    max_entries: usize,
}

impl HistoryStore {
    pub fn new(pool: SqlitePool, max_entries: usize) -> Self {
        Self { pool, max_entries }
    }

    /// Newest first
    ///
    /// Rows with an unknown source or timestamp are skipped.
    pub async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT artist, title, album, source, played_at
            FROM history
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let source: String = row.get("source");
            let played_at: String = row.get("played_at");
            let Some(source) = SourceKind::parse(&source) else {
                warn!("Skipping history row with unknown source '{}'", source);
                continue;
            };
            let Ok(timestamp) = DateTime::parse_from_rfc3339(&played_at) else {
                warn!("Skipping history row with bad timestamp '{}'", played_at);
                continue;
            };
            entries.push(HistoryEntry {
                artist: row.get("artist"),
                title: row.get("title"),
                album: row.get("album"),
                source,
                timestamp: timestamp.with_timezone(&Utc),
            });
        }
        Ok(entries)
    }

    pub async fn count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM history")
            .fetch_one(&self.pool)
            .await?)
    }
}

#[async_trait]
impl HistorySink for HistoryStore {
    async fn record(&self, entry: HistoryEntry) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO history (artist, title, album, source, played_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.artist)
        .bind(&entry.title)
        .bind(&entry.album)
        .bind(entry.source.as_str())
        .bind(entry.timestamp.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM history
            WHERE id NOT IN (SELECT id FROM history ORDER BY id DESC LIMIT ?)
            "#,
        )
        .bind(self.max_entries as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
