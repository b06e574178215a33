//! Queue database operations
//!
//! Durable per-station queue storage. Every lifecycle transition is a single
//! conditional UPDATE, so the state checks and the write happen atomically
//! inside SQLite even when several processes share the database.

use super::entry::{visibility_for, EntryId, NewQueueEntry, QueueEntry, StationId};
use crate::catalog::{MediaResolver, PlaylistClassifier, SqliteCatalog};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use onair_common::db::QueueRow;
use onair_common::time;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tracing::debug;

macro_rules! queue_columns {
    () => {
        "id, station_id, source_kind, playlist_id, media_id, request_id, autodj_custom_uri, \
         title, artist, sent_to_autodj, is_played, is_visible, timestamp_cued, \
         timestamp_played, duration"
    };
}

macro_rules! queue_select {
    ($tail:literal) => {
        concat!("SELECT ", queue_columns!(), " FROM station_queue ", $tail)
    };
}

/// Durable ordered storage of queue entries
#[derive(Clone)]
pub struct QueueStore {
    db: Pool<Sqlite>,
    media: Arc<dyn MediaResolver>,
    playlists: Arc<dyn PlaylistClassifier>,
}

impl QueueStore {
    pub fn new(
        db: Pool<Sqlite>,
        media: Arc<dyn MediaResolver>,
        playlists: Arc<dyn PlaylistClassifier>,
    ) -> Self {
        Self {
            db,
            media,
            playlists,
        }
    }

    /// Store resolving media and playlists from the same database
    pub fn with_sqlite_catalog(db: Pool<Sqlite>) -> Self {
        let catalog = Arc::new(SqliteCatalog::new(db.clone()));
        Self::new(db, catalog.clone(), catalog)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.db
    }

    /// Cue a new entry
    ///
    /// Copies duration, title and artist from the media record when media
    /// is attached and computes visibility from the playlist.
    pub async fn insert(&self, new_entry: NewQueueEntry) -> Result<EntryId> {
        let NewQueueEntry {
            station_id,
            source,
            cued_at,
        } = new_entry;
        source.validate()?;

        let media = match source.media_id() {
            Some(media_id) => self.media.resolve(media_id).await?,
            None => None,
        };

        let is_jingle = match source.playlist_id() {
            Some(playlist_id) => self.playlists.is_jingle(playlist_id).await?,
            None => false,
        };
        let is_visible = visibility_for(&source, is_jingle);
        let cued_at = cued_at.unwrap_or_else(time::now);

        let result = sqlx::query(
            r#"
            INSERT INTO station_queue (
                station_id, source_kind, playlist_id, media_id, request_id, autodj_custom_uri,
                title, artist, is_visible, timestamp_cued, duration
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(station_id)
        .bind(source.kind().as_str())
        .bind(source.playlist_id())
        .bind(source.media_id())
        .bind(source.request_id())
        .bind(source.custom_uri())
        .bind(media.as_ref().and_then(|m| m.title.clone()))
        .bind(media.as_ref().and_then(|m| m.artist.clone()))
        .bind(is_visible)
        .bind(time::to_micros(cued_at))
        .bind(media.as_ref().and_then(|m| m.length))
        .execute(&self.db)
        .await
        .map_err(|e| foreign_key_to_not_found(e, station_id))?;

        let id = result.last_insert_rowid();
        debug!(
            "Cued entry {} on station {} from {}",
            id,
            station_id,
            source.kind()
        );
        Ok(id)
    }

    /// URI AutoDJ should play for an entry
    ///
    /// Custom URIs pass through; otherwise the media path. Empty when the
    /// entry has no media or the media record is gone.
    pub async fn audio_uri(&self, entry: &QueueEntry) -> Result<String> {
        if let Some(uri) = entry.source.custom_uri() {
            return Ok(uri.to_string());
        }

        match entry.source.media_id() {
            Some(media_id) => Ok(self
                .media
                .resolve(media_id)
                .await?
                .map(|media| media.path)
                .unwrap_or_default()),
            None => Ok(String::new()),
        }
    }

    /// Lookup; `None` if purged or never existed
    pub async fn get(&self, id: EntryId) -> Result<Option<QueueEntry>> {
        sqlx::query_as::<_, QueueRow>(queue_select!("WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(QueueEntry::try_from)
            .transpose()
    }

    /// Lookup that fails with `NotFound`
    pub async fn require(&self, id: EntryId) -> Result<QueueEntry> {
        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("queue entry {}", id)))
    }

    /// Unplayed entries in play order, streamed from the database
    ///
    /// Reflects live state at call time; the stream cannot be restarted.
    pub fn upcoming(&self, station_id: StationId, limit: u32) -> BoxStream<'_, Result<QueueEntry>> {
        sqlx::query_as::<_, QueueRow>(queue_select!(
            "WHERE station_id = ? AND is_played = 0 ORDER BY timestamp_cued ASC, id ASC LIMIT ?"
        ))
        .bind(station_id)
        .bind(i64::from(limit))
        .fetch(&self.db)
        .map(|row| row.map_err(Error::from).and_then(QueueEntry::try_from))
        .boxed()
    }

    /// Unplayed entries in play order
    pub async fn list_upcoming(&self, station_id: StationId, limit: u32) -> Result<Vec<QueueEntry>> {
        self.upcoming(station_id, limit).try_collect().await
    }

    /// Played entries, most recent first
    pub async fn list_history(&self, station_id: StationId, limit: u32) -> Result<Vec<QueueEntry>> {
        sqlx::query_as::<_, QueueRow>(queue_select!(
            "WHERE station_id = ? AND is_played = 1 ORDER BY timestamp_played DESC, id DESC LIMIT ?"
        ))
        .bind(station_id)
        .bind(i64::from(limit))
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(QueueEntry::try_from)
        .collect()
    }

    /// Earliest upcoming entry not yet sent to AutoDJ
    pub async fn next_unsent(&self, station_id: StationId) -> Result<Option<QueueEntry>> {
        sqlx::query_as::<_, QueueRow>(queue_select!(
            "WHERE station_id = ? AND is_played = 0 AND sent_to_autodj = 0 \
             ORDER BY timestamp_cued ASC, id ASC LIMIT 1"
        ))
        .bind(station_id)
        .fetch_optional(&self.db)
        .await?
        .map(QueueEntry::try_from)
        .transpose()
    }

    /// Entry sent to AutoDJ and not yet confirmed played
    pub async fn in_flight(&self, station_id: StationId) -> Result<Option<QueueEntry>> {
        sqlx::query_as::<_, QueueRow>(queue_select!(
            "WHERE station_id = ? AND is_played = 0 AND sent_to_autodj = 1 \
             ORDER BY timestamp_cued ASC, id ASC LIMIT 1"
        ))
        .bind(station_id)
        .fetch_optional(&self.db)
        .await?
        .map(QueueEntry::try_from)
        .transpose()
    }

    /// Stations that have at least one entry waiting for dispatch
    pub async fn stations_with_pending(&self) -> Result<Vec<StationId>> {
        let ids = sqlx::query_scalar(
            "SELECT DISTINCT station_id FROM station_queue \
             WHERE is_played = 0 AND sent_to_autodj = 0 ORDER BY station_id",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
    }

    /// Mark an entry as handed to AutoDJ
    ///
    /// Idempotent: returns `false` without writing when already set. Fails
    /// with `Contention` while a different entry of the station is in flight.
    pub async fn mark_sent_to_autodj(&self, id: EntryId) -> Result<bool> {
        let changed = sqlx::query(
            "UPDATE station_queue SET sent_to_autodj = 1 \
             WHERE id = ? AND sent_to_autodj = 0 \
             AND NOT EXISTS ( \
                 SELECT 1 FROM station_queue AS other \
                 WHERE other.station_id = station_queue.station_id \
                 AND other.id != station_queue.id \
                 AND other.sent_to_autodj = 1 AND other.is_played = 0 \
             )",
        )
        .bind(id)
        .execute(&self.db)
        .await?
        .rows_affected();

        if changed == 0 {
            let entry = self.require(id).await?;
            if entry.sent_to_autodj {
                return Ok(false);
            }
            return Err(Error::Contention {
                station_id: entry.station_id,
                entry_id: id,
            });
        }
        Ok(true)
    }

    /// Atomic dispatch compare-and-set
    ///
    /// Succeeds only when the entry belongs to the station, is neither sent
    /// nor played, and no other entry of the station is in flight. A lost
    /// race yields `Contention`.
    pub async fn claim_for_dispatch(&self, station_id: StationId, id: EntryId) -> Result<QueueEntry> {
        let claimed = sqlx::query_as::<_, QueueRow>(concat!(
            "UPDATE station_queue SET sent_to_autodj = 1 \
             WHERE id = ? AND station_id = ? AND sent_to_autodj = 0 AND is_played = 0 \
             AND NOT EXISTS ( \
                 SELECT 1 FROM station_queue \
                 WHERE station_id = ? AND sent_to_autodj = 1 AND is_played = 0 \
             ) \
             RETURNING ",
            queue_columns!()
        ))
        .bind(id)
        .bind(station_id)
        .bind(station_id)
        .fetch_optional(&self.db)
        .await?;

        match claimed {
            Some(row) => QueueEntry::try_from(row),
            None => match self.get(id).await? {
                Some(entry) if entry.station_id == station_id => {
                    Err(Error::Contention { station_id, entry_id: id })
                }
                _ => Err(Error::NotFound(format!(
                    "queue entry {} on station {}",
                    id, station_id
                ))),
            },
        }
    }

    /// Strict played transition
    ///
    /// Fails with `InvalidTransition` when the entry was already played.
    /// Also sets `sent_to_autodj` and stamps `timestamp_played`.
    pub async fn mark_played(&self, id: EntryId, played_at: DateTime<Utc>) -> Result<QueueEntry> {
        let updated = sqlx::query_as::<_, QueueRow>(concat!(
            "UPDATE station_queue SET is_played = 1, sent_to_autodj = 1, timestamp_played = ? \
             WHERE id = ? AND is_played = 0 RETURNING ",
            queue_columns!()
        ))
        .bind(time::to_micros(played_at))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        match updated {
            Some(row) => QueueEntry::try_from(row),
            None => {
                self.require(id).await?;
                Err(Error::InvalidTransition {
                    entry_id: id,
                    reason: "entry already played".to_string(),
                })
            }
        }
    }

    /// Delete a station's played entries with `timestamp_played < cutoff`
    pub async fn purge_older_than(&self, station_id: StationId, cutoff: DateTime<Utc>) -> Result<u64> {
        let removed = sqlx::query(
            "DELETE FROM station_queue \
             WHERE station_id = ? AND is_played = 1 AND timestamp_played < ?",
        )
        .bind(station_id)
        .bind(time::to_micros(cutoff))
        .execute(&self.db)
        .await?
        .rows_affected();

        Ok(removed)
    }

    /// Delete played entries with `timestamp_played < cutoff` on every station
    pub async fn purge_all_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let removed =
            sqlx::query("DELETE FROM station_queue WHERE is_played = 1 AND timestamp_played < ?")
                .bind(time::to_micros(cutoff))
                .execute(&self.db)
                .await?
                .rows_affected();

        Ok(removed)
    }

    /// Recompute `is_visible` from the current playlist; returns the new value
    pub async fn recompute_visibility(&self, id: EntryId) -> Result<bool> {
        let entry = self.require(id).await?;
        let is_jingle = match entry.source.playlist_id() {
            Some(playlist_id) => self.playlists.is_jingle(playlist_id).await?,
            None => false,
        };
        let is_visible = visibility_for(&entry.source, is_jingle);

        if is_visible != entry.is_visible {
            sqlx::query("UPDATE station_queue SET is_visible = ? WHERE id = ?")
                .bind(is_visible)
                .bind(id)
                .execute(&self.db)
                .await?;
        }
        Ok(is_visible)
    }

    /// Move an entry to another playlist (provenance only)
    ///
    /// Visibility is not touched; call [`Self::recompute_visibility`] after.
    pub async fn reassign_playlist(&self, id: EntryId, playlist_id: i64) -> Result<QueueEntry> {
        let entry = self.require(id).await?;
        let source = entry.source.reassigned_to(playlist_id)?;

        let row = sqlx::query_as::<_, QueueRow>(concat!(
            "UPDATE station_queue SET source_kind = ?, playlist_id = ?, media_id = ? \
             WHERE id = ? RETURNING ",
            queue_columns!()
        ))
        .bind(source.kind().as_str())
        .bind(source.playlist_id())
        .bind(source.media_id())
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| foreign_key_to_not_found_playlist(e, playlist_id))?
        .ok_or_else(|| Error::NotFound(format!("queue entry {}", id)))?;

        QueueEntry::try_from(row)
    }

    /// Remove an entry that has not been dispatched yet
    pub async fn remove(&self, id: EntryId) -> Result<QueueEntry> {
        let removed = sqlx::query_as::<_, QueueRow>(concat!(
            "DELETE FROM station_queue WHERE id = ? AND sent_to_autodj = 0 RETURNING ",
            queue_columns!()
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        match removed {
            Some(row) => QueueEntry::try_from(row),
            None => {
                let entry = self.require(id).await?;
                Err(Error::InvalidTransition {
                    entry_id: id,
                    reason: format!("cannot remove an entry that is {}", entry.lifecycle()),
                })
            }
        }
    }
}

fn foreign_key_to_not_found(err: sqlx::Error, station_id: StationId) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => Error::NotFound(
            format!("station {} or one of the referenced library records", station_id),
        ),
        _ => Error::Database(err),
    }
}

fn foreign_key_to_not_found_playlist(err: sqlx::Error, playlist_id: i64) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            Error::NotFound(format!("playlist {}", playlist_id))
        }
        _ => Error::Database(err),
    }
}
