//! Shared service state
//!
//! One bundle of the services that operate on a station database: the
//! event bus, the queue scheduler and the station repository. Every service
//! shares the same pool and the same bus.

use crate::db::settings::{load_scheduler_settings, SchedulerSettings};
use crate::error::Result;
use crate::queue::{ExternalNotifier, QueueScheduler, QueueStore};
use crate::station::StationRepository;
use onair_common::events::{EventBus, OnAirEvent};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct SharedState {
    pub db: Pool<Sqlite>,
    pub settings: SchedulerSettings,
    pub events: EventBus,
    pub scheduler: Arc<QueueScheduler>,
    pub stations: StationRepository,
}

impl SharedState {
    /// Build the services, reading tunables from the settings table
    pub async fn load(db: Pool<Sqlite>, notifier: Arc<dyn ExternalNotifier>) -> Result<Self> {
        let settings = load_scheduler_settings(&db).await?;
        Ok(Self::with_settings(db, notifier, settings))
    }

    pub fn with_settings(
        db: Pool<Sqlite>,
        notifier: Arc<dyn ExternalNotifier>,
        settings: SchedulerSettings,
    ) -> Self {
        let events = EventBus::new(settings.event_bus_capacity);
        let store = QueueStore::with_sqlite_catalog(db.clone());
        let scheduler = Arc::new(QueueScheduler::new(
            store,
            notifier,
            events.clone(),
            &settings,
        ));
        let stations = StationRepository::new(db.clone(), events.clone());

        Self {
            db,
            settings,
            events,
            scheduler,
            stations,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<OnAirEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::settings::set_setting;
    use crate::queue::{LoggingNotifier, NewQueueEntry};
    use crate::station::{ConfigChange, NewStation};
    use onair_common::db::init_memory_database;

    #[tokio::test]
    async fn test_services_share_event_bus() {
        let db = init_memory_database().await.unwrap();
        set_setting(&db, "event_bus_capacity", 8).await.unwrap();
        let state = SharedState::load(db, Arc::new(LoggingNotifier)).await.unwrap();
        assert_eq!(state.events.capacity(), 8);

        let mut rx = state.subscribe_events();
        let station = state.stations.create(NewStation::new("Test FM", "test_fm")).await.unwrap();
        state.stations.restart_tracker().mark_started(station.id).await.unwrap();
        state
            .stations
            .apply(station.id, ConfigChange::MaxBitrate(320))
            .await
            .unwrap();
        state
            .scheduler
            .cue(NewQueueEntry::custom_uri(station.id, "http://relay/live"))
            .await
            .unwrap();

        assert!(matches!(rx.recv().await.unwrap(), OnAirEvent::RestartRequested { .. }));
        assert!(matches!(rx.recv().await.unwrap(), OnAirEvent::EntryCued { .. }));
    }
}
