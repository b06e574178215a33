//! Settings database access
//!
//! Read/write scheduler tunables from the settings table (key-value store).
//! The table is seeded with defaults by `onair_common::db::init_database`;
//! the getters here still fall back to the same defaults when a key is
//! missing.

use crate::error::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for `queue_history_retention_days` (about a century)
pub const MAX_HISTORY_RETENTION_DAYS: i64 = 36_500;

/// Scheduler tunables
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    /// Days a played entry is kept before it may be purged
    pub history_retention_days: i64,
    /// Attempts at the dispatch compare-and-set before surfacing contention
    pub dispatch_retry_limit: u32,
    /// Base delay between dispatch attempts (doubled each retry)
    pub dispatch_retry_backoff: Duration,
    /// How often the purge job runs
    pub purge_interval: Duration,
    /// How often the run loop polls stations for dispatch
    pub poll_interval: Duration,
    /// EventBus channel capacity
    pub event_bus_capacity: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            history_retention_days: 7,
            dispatch_retry_limit: 3,
            dispatch_retry_backoff: Duration::from_millis(50),
            purge_interval: Duration::from_secs(3600),
            poll_interval: Duration::from_millis(1000),
            event_bus_capacity: 100,
        }
    }
}

/// Load scheduler settings, using defaults for missing keys
pub async fn load_scheduler_settings(db: &Pool<Sqlite>) -> Result<SchedulerSettings> {
    let defaults = SchedulerSettings::default();

    let history_retention_days = get_setting::<i64>(db, "queue_history_retention_days")
        .await?
        .unwrap_or(defaults.history_retention_days);
    if !(0..=MAX_HISTORY_RETENTION_DAYS).contains(&history_retention_days) {
        return Err(Error::Config(format!(
            "queue_history_retention_days must be between 0 and {} (got {})",
            MAX_HISTORY_RETENTION_DAYS, history_retention_days
        )));
    }

    let dispatch_retry_limit = get_setting::<u32>(db, "queue_dispatch_retry_limit")
        .await?
        .unwrap_or(defaults.dispatch_retry_limit)
        .max(1);

    let dispatch_retry_backoff = get_setting::<u64>(db, "queue_dispatch_retry_backoff_ms")
        .await?
        .map(Duration::from_millis)
        .unwrap_or(defaults.dispatch_retry_backoff);

    let purge_interval = get_setting::<u64>(db, "queue_purge_interval_secs")
        .await?
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or(defaults.purge_interval);

    let poll_interval = get_setting::<u64>(db, "queue_poll_interval_ms")
        .await?
        .map(|ms| Duration::from_millis(ms.max(10)))
        .unwrap_or(defaults.poll_interval);

    let event_bus_capacity = get_setting::<usize>(db, "event_bus_capacity")
        .await?
        .unwrap_or(defaults.event_bus_capacity)
        .max(1);

    Ok(SchedulerSettings {
        history_retention_days,
        dispatch_retry_limit,
        dispatch_retry_backoff,
        purge_interval,
        poll_interval,
        event_bus_capacity,
    })
}

/// Generic setting getter
///
/// Returns `Ok(None)` when the key is absent, `Err(Config)` when the stored
/// value does not parse.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => match s.trim().parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter (insert or update)
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}
