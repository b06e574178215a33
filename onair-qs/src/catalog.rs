//! Media and playlist lookups consumed by the queue
//!
//! The queue only needs two facts from the wider library: a media item's
//! calculated length (plus what to tell AutoDJ to play), and whether a
//! playlist is a jingle playlist. Both are traits so the scheduler can run
//! against the SQLite catalog or a test double.

use crate::error::Result;
use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

/// What the queue copies from a media record at cue time
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    /// Path handed to AutoDJ
    pub path: String,
    /// Calculated length in seconds, if analysed
    pub length: Option<f64>,
    pub title: Option<String>,
    pub artist: Option<String>,
}

/// Resolves media ids to their playable metadata
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// `Ok(None)` when the media id is unknown
    async fn resolve(&self, media_id: i64) -> Result<Option<MediaInfo>>;
}

/// Classifies playlists for visibility
#[async_trait]
pub trait PlaylistClassifier: Send + Sync {
    /// Jingle playlists are hidden from public history.
    /// Unknown playlists classify as not-jingle.
    async fn is_jingle(&self, playlist_id: i64) -> Result<bool>;
}

/// Catalog backed by the `station_media` and `station_playlists` tables
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    db: Pool<Sqlite>,
}

impl SqliteCatalog {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MediaResolver for SqliteCatalog {
    async fn resolve(&self, media_id: i64) -> Result<Option<MediaInfo>> {
        let row = sqlx::query_as::<_, (String, Option<f64>, Option<String>, Option<String>)>(
            "SELECT path, length, title, artist FROM station_media WHERE id = ?",
        )
        .bind(media_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(path, length, title, artist)| MediaInfo {
            path,
            length,
            title,
            artist,
        }))
    }
}

#[async_trait]
impl PlaylistClassifier for SqliteCatalog {
    async fn is_jingle(&self, playlist_id: i64) -> Result<bool> {
        let is_jingle: Option<bool> =
            sqlx::query_scalar("SELECT is_jingle FROM station_playlists WHERE id = ?")
                .bind(playlist_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(is_jingle.unwrap_or(false))
    }
}
