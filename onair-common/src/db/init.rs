//! Database initialization
//!
//! Opens (or creates) the SQLite database, applies connection pragmas and
//! creates every table idempotently. Safe to call on every startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// SQLite busy timeout applied to every pooled connection
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        // WAL lets the purge job read while a dispatcher writes
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// The pool is limited to one connection: every SQLite in-memory connection
/// is a separate database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables, indexes and triggers (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_stations_table(pool).await?;
    create_station_playlists_table(pool).await?;
    create_station_media_table(pool).await?;
    create_station_requests_table(pool).await?;
    create_station_queue_table(pool).await?;
    debug!("Schema verified");
    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_stations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            short_name TEXT NOT NULL UNIQUE,
            description TEXT,
            is_enabled INTEGER NOT NULL DEFAULT 1,
            frontend_type TEXT NOT NULL DEFAULT 'icecast'
                CHECK (frontend_type IN ('icecast', 'shoutcast', 'remote')),
            backend_type TEXT NOT NULL DEFAULT 'liquidsoap'
                CHECK (backend_type IN ('liquidsoap', 'none')),
            frontend_config TEXT NOT NULL DEFAULT '{}',
            backend_config TEXT NOT NULL DEFAULT '{}',
            url TEXT,
            enable_streamers INTEGER NOT NULL DEFAULT 0,
            max_bitrate INTEGER NOT NULL DEFAULT 0,
            needs_restart INTEGER NOT NULL DEFAULT 0,
            has_started INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_station_playlists_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS station_playlists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            station_id INTEGER NOT NULL REFERENCES stations(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            is_jingle INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_station_media_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS station_media (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            station_id INTEGER NOT NULL REFERENCES stations(id) ON DELETE CASCADE,
            path TEXT NOT NULL,
            title TEXT,
            artist TEXT,
            length REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_station_requests_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS station_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            station_id INTEGER NOT NULL REFERENCES stations(id) ON DELETE CASCADE,
            track_id INTEGER NOT NULL REFERENCES station_media(id) ON DELETE CASCADE,
            requested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_station_queue_table(pool: &SqlitePool) -> Result<()> {
    // The source_kind CHECK keeps provenance a single populated arm.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS station_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            station_id INTEGER NOT NULL REFERENCES stations(id) ON DELETE CASCADE,
            source_kind TEXT NOT NULL
                CHECK (source_kind IN ('playlist', 'media', 'request', 'custom_uri')),
            playlist_id INTEGER REFERENCES station_playlists(id) ON DELETE CASCADE,
            media_id INTEGER REFERENCES station_media(id) ON DELETE CASCADE,
            request_id INTEGER REFERENCES station_requests(id) ON DELETE CASCADE,
            autodj_custom_uri TEXT,
            title TEXT,
            artist TEXT,
            sent_to_autodj INTEGER NOT NULL DEFAULT 0,
            is_played INTEGER NOT NULL DEFAULT 0,
            is_visible INTEGER NOT NULL DEFAULT 1,
            timestamp_cued INTEGER NOT NULL,
            timestamp_played INTEGER,
            duration REAL,
            CHECK ((is_played = 0) = (timestamp_played IS NULL)),
            CHECK (is_played = 0 OR sent_to_autodj = 1),
            CHECK (
                (source_kind = 'playlist' AND playlist_id IS NOT NULL
                    AND request_id IS NULL AND autodj_custom_uri IS NULL)
                OR (source_kind = 'media' AND media_id IS NOT NULL
                    AND playlist_id IS NULL AND request_id IS NULL AND autodj_custom_uri IS NULL)
                OR (source_kind = 'request' AND request_id IS NOT NULL
                    AND playlist_id IS NULL AND autodj_custom_uri IS NULL)
                OR (source_kind = 'custom_uri' AND autodj_custom_uri IS NOT NULL
                    AND playlist_id IS NULL AND media_id IS NULL AND request_id IS NULL)
            )
        )
        "#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_queue_is_played ON station_queue(station_id, is_played)",
        "CREATE INDEX IF NOT EXISTS idx_queue_timestamp_played ON station_queue(station_id, timestamp_played)",
        "CREATE INDEX IF NOT EXISTS idx_queue_sent_to_autodj ON station_queue(station_id, sent_to_autodj)",
        "CREATE INDEX IF NOT EXISTS idx_queue_timestamp_cued ON station_queue(station_id, timestamp_cued)",
    ];
    for sql in indexes {
        sqlx::query(sql).execute(pool).await?;
    }

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS station_queue_monotonic_flags
        BEFORE UPDATE OF sent_to_autodj, is_played ON station_queue
        WHEN (OLD.sent_to_autodj = 1 AND NEW.sent_to_autodj = 0)
          OR (OLD.is_played = 1 AND NEW.is_played = 0)
        BEGIN
            SELECT RAISE(ABORT, 'queue lifecycle flags are monotonic');
        END
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Seed scheduler settings that are missing
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "queue_history_retention_days", "7").await?;
    ensure_setting(pool, "queue_dispatch_retry_limit", "3").await?;
    ensure_setting(pool, "queue_dispatch_retry_backoff_ms", "50").await?;
    ensure_setting(pool, "queue_purge_interval_secs", "3600").await?;
    ensure_setting(pool, "queue_poll_interval_ms", "1000").await?;
    ensure_setting(pool, "event_bus_capacity", "100").await?;
    Ok(())
}

/// Insert a setting only if it does not exist yet
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        debug!("Initialized setting '{}' with default value: {}", key, default_value);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_database_has_queue_indexes() {
        let pool = init_memory_database().await.unwrap();

        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'station_queue' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(
            names,
            vec![
                "idx_queue_is_played",
                "idx_queue_sent_to_autodj",
                "idx_queue_timestamp_cued",
                "idx_queue_timestamp_played",
            ]
        );
    }

    #[tokio::test]
    async fn test_schema_creation_is_idempotent() {
        let pool = init_memory_database().await.unwrap();
        create_schema(&pool).await.unwrap();
        init_default_settings(&pool).await.unwrap();

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = 'queue_history_retention_days'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_existing_setting_is_not_overwritten() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query("UPDATE settings SET value = '14' WHERE key = 'queue_history_retention_days'")
            .execute(&pool)
            .await
            .unwrap();

        init_default_settings(&pool).await.unwrap();

        let value: String =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = 'queue_history_retention_days'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(value, "14");
    }
}
