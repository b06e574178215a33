//! Restart flag tracker
//!
//! `needs_restart` is a sticky bit telling the operator that the station's
//! broadcast processes run with stale configuration. It only makes sense
//! for a station that has local services and has been started at least
//! once; every other station is pinned clean.
//!
//! Each operation is a single UPDATE with the eligibility gate written in
//! SQL, so concurrent requests never observe a half-applied state.

use super::model::StationId;
use crate::error::{Error, Result};
use onair_common::events::{EventBus, OnAirEvent, RestartReason};
use onair_common::time;
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

/// `has_local_services()` expressed over the stations columns
pub(crate) const HAS_LOCAL_SERVICES: &str =
    "(is_enabled = 1 AND (frontend_type != 'remote' OR backend_type != 'none'))";

#[derive(Clone)]
pub struct RestartFlagTracker {
    db: Pool<Sqlite>,
    events: EventBus,
}

impl RestartFlagTracker {
    pub fn new(db: Pool<Sqlite>, events: EventBus) -> Self {
        Self { db, events }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Flag the station for restart when eligible; returns the resulting flag
    pub async fn request_restart(&self, station_id: StationId, reason: RestartReason) -> Result<bool> {
        let sql = format!(
            "UPDATE stations SET needs_restart = ({} AND has_started = 1) \
             WHERE id = ? RETURNING needs_restart",
            HAS_LOCAL_SERVICES
        );
        let needs_restart = self.update_flag(&sql, station_id).await?;

        if needs_restart {
            info!("Station {} needs restart ({})", station_id, reason);
            self.events.emit_lossy(OnAirEvent::RestartRequested {
                station_id,
                reason,
                timestamp: time::now(),
            });
        } else {
            debug!(
                "Restart request for station {} ignored: not running locally",
                station_id
            );
        }
        Ok(needs_restart)
    }

    /// Clear the restart flag after the station was restarted
    pub async fn clear_restart(&self, station_id: StationId) -> Result<()> {
        let cleared = sqlx::query(
            "UPDATE stations SET needs_restart = 0 WHERE id = ? AND needs_restart = 1",
        )
        .bind(station_id)
        .execute(&self.db)
        .await?
        .rows_affected();

        if cleared == 0 {
            self.exists(station_id).await?;
            return Ok(());
        }

        info!("Station {} restart flag cleared", station_id);
        self.events.emit_lossy(OnAirEvent::RestartCleared {
            station_id,
            timestamp: time::now(),
        });
        Ok(())
    }

    /// Record that the station's services were started; returns `has_started`
    pub async fn mark_started(&self, station_id: StationId) -> Result<bool> {
        self.update_flag(
            "UPDATE stations SET has_started = 1 WHERE id = ? RETURNING has_started",
            station_id,
        )
        .await
    }

    /// Record that the station's services were stopped; returns `has_started`
    ///
    /// Stations without local services stay marked as started.
    pub async fn mark_stopped(&self, station_id: StationId) -> Result<bool> {
        let sql = format!(
            "UPDATE stations SET has_started = (NOT {local}), \
             needs_restart = 0 \
             WHERE id = ? RETURNING has_started",
            local = HAS_LOCAL_SERVICES
        );
        self.update_flag(&sql, station_id).await
    }

    /// Re-apply the gates after a change to the enable flag or adapters
    pub async fn reconcile(&self, station_id: StationId) -> Result<()> {
        let sql = format!(
            "UPDATE stations SET \
             has_started = CASE WHEN {local} THEN has_started ELSE 1 END, \
             needs_restart = CASE WHEN {local} AND has_started = 1 THEN needs_restart ELSE 0 END \
             WHERE id = ?",
            local = HAS_LOCAL_SERVICES
        );
        let changed = sqlx::query(&sql)
            .bind(station_id)
            .execute(&self.db)
            .await?
            .rows_affected();

        if changed == 0 {
            return Err(station_not_found(station_id));
        }
        Ok(())
    }

    async fn update_flag(&self, sql: &str, station_id: StationId) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(sql)
            .bind(station_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| station_not_found(station_id))
    }

    async fn exists(&self, station_id: StationId) -> Result<()> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM stations WHERE id = ?")
            .bind(station_id)
            .fetch_optional(&self.db)
            .await?
            .map(|_| ())
            .ok_or_else(|| station_not_found(station_id))
    }
}

pub(crate) fn station_not_found(station_id: StationId) -> Error {
    Error::NotFound(format!("station {}", station_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use onair_common::db::init_memory_database;

    async fn setup() -> RestartFlagTracker {
        let db = init_memory_database().await.unwrap();
        sqlx::query(
            "INSERT INTO stations (id, name, short_name, frontend_type, backend_type, is_enabled) VALUES \
             (1, 'Local', 'local', 'icecast', 'liquidsoap', 1), \
             (2, 'Relay', 'relay', 'remote', 'none', 1), \
             (3, 'Off', 'off', 'icecast', 'liquidsoap', 0)",
        )
        .execute(&db)
        .await
        .unwrap();
        RestartFlagTracker::new(db, EventBus::new(16))
    }

    async fn flags(tracker: &RestartFlagTracker, id: StationId) -> (bool, bool) {
        sqlx::query_as("SELECT needs_restart, has_started FROM stations WHERE id = ?")
            .bind(id)
            .fetch_one(&tracker.db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_requires_started_station() {
        let tracker = setup().await;

        assert!(!tracker.request_restart(1, RestartReason::Manual).await.unwrap());
        tracker.mark_started(1).await.unwrap();
        assert!(tracker.request_restart(1, RestartReason::Manual).await.unwrap());
        assert_eq!(flags(&tracker, 1).await, (true, true));
    }

    #[tokio::test]
    async fn test_ineligible_stations_pinned_clean() {
        let tracker = setup().await;

        for id in [2, 3] {
            tracker.mark_started(id).await.unwrap();
            assert!(!tracker.request_restart(id, RestartReason::UrlChanged).await.unwrap());
            assert!(!flags(&tracker, id).await.0);
        }
    }

    #[tokio::test]
    async fn test_dirty_until_cleared() {
        let tracker = setup().await;
        let mut events = tracker.events().subscribe();
        tracker.mark_started(1).await.unwrap();

        tracker.request_restart(1, RestartReason::MaxBitrateChanged).await.unwrap();
        tracker.request_restart(1, RestartReason::UrlChanged).await.unwrap();
        assert!(flags(&tracker, 1).await.0);

        tracker.clear_restart(1).await.unwrap();
        assert!(!flags(&tracker, 1).await.0);

        // clearing a clean station is silent
        tracker.clear_restart(1).await.unwrap();

        let mut requested = 0;
        let mut cleared = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                OnAirEvent::RestartRequested { .. } => requested += 1,
                OnAirEvent::RestartCleared { .. } => cleared += 1,
                _ => {}
            }
        }
        assert_eq!((requested, cleared), (2, 1));
    }

    #[tokio::test]
    async fn test_mark_stopped_without_local_services_stays_started() {
        let tracker = setup().await;

        assert!(tracker.mark_stopped(2).await.unwrap());
        assert!(tracker.mark_stopped(3).await.unwrap());
        assert!(!tracker.mark_stopped(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_clears_pending_restart() {
        let tracker = setup().await;
        tracker.mark_started(1).await.unwrap();
        tracker.request_restart(1, RestartReason::Manual).await.unwrap();

        tracker.mark_stopped(1).await.unwrap();
        assert_eq!(flags(&tracker, 1).await, (false, false));
    }

    #[tokio::test]
    async fn test_unknown_station() {
        let tracker = setup().await;
        assert!(matches!(
            tracker.request_restart(9, RestartReason::Manual).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(tracker.clear_restart(9).await, Err(Error::NotFound(_))));
        assert!(matches!(tracker.mark_started(9).await, Err(Error::NotFound(_))));
    }
}
