//! Dispatch polling loop
//!
//! Stands in for the AutoDJ pull: on every tick, each station with pending
//! entries gets one `dispatch_next` attempt. Stations with an entry still
//! playing simply report `InFlight` and are skipped.

use crate::queue::{DispatchOutcome, QueueScheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub struct DispatchLoop {
    scheduler: Arc<QueueScheduler>,
    period: Duration,
}

impl DispatchLoop {
    pub fn new(scheduler: Arc<QueueScheduler>, period: Duration) -> Self {
        Self { scheduler, period }
    }

    /// One pass over all stations; returns how many entries were dispatched
    pub async fn tick(&self) -> usize {
        let stations = match self.scheduler.store().stations_with_pending().await {
            Ok(stations) => stations,
            Err(e) => {
                error!("Could not list stations with pending entries: {}", e);
                return 0;
            }
        };

        let mut dispatched = 0;
        for station_id in stations {
            match self.scheduler.dispatch_next(station_id).await {
                Ok(DispatchOutcome::Dispatched(_)) => dispatched += 1,
                Ok(DispatchOutcome::InFlight(entry)) => {
                    debug!("Station {}: entry {} still playing", station_id, entry.id)
                }
                Ok(DispatchOutcome::Idle) => {}
                Err(e) if e.is_transient() => {
                    warn!("Station {}: dispatch contention, will retry: {}", station_id, e)
                }
                Err(e) => error!("Station {}: dispatch failed: {}", station_id, e),
            }
        }
        dispatched
    }

    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        info!("Starting dispatch loop (every {}ms)", self.period.as_millis());

        tokio::spawn(async move {
            let mut timer = interval(self.period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        self.tick().await;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("Dispatch loop stopped");
                            return;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::settings::SchedulerSettings;
    use crate::queue::{ChannelNotifier, NewQueueEntry, QueueStore};
    use onair_common::db::init_memory_database;
    use onair_common::events::EventBus;
    use onair_common::time;

    #[tokio::test]
    async fn test_tick_dispatches_one_per_station() {
        let db = init_memory_database().await.unwrap();
        sqlx::query("INSERT INTO stations (id, name, short_name) VALUES (1, 'A', 'a'), (2, 'B', 'b')")
            .execute(&db)
            .await
            .unwrap();
        let (notifier, mut rx) = ChannelNotifier::new();
        let scheduler = Arc::new(QueueScheduler::new(
            QueueStore::with_sqlite_catalog(db),
            Arc::new(notifier),
            EventBus::new(16),
            &SchedulerSettings::default(),
        ));

        let first = scheduler.cue(NewQueueEntry::custom_uri(1, "a1")).await.unwrap();
        scheduler.cue(NewQueueEntry::custom_uri(1, "a2")).await.unwrap();
        scheduler.cue(NewQueueEntry::custom_uri(2, "b1")).await.unwrap();

        let dispatch = DispatchLoop::new(scheduler.clone(), Duration::from_millis(100));
        assert_eq!(dispatch.tick().await, 2);
        // both stations now have an entry in flight
        assert_eq!(dispatch.tick().await, 0);

        scheduler.on_playback_confirmed(first.id, time::now()).await.unwrap();
        assert_eq!(dispatch.tick().await, 1);

        let mut uris = Vec::new();
        while let Ok(d) = rx.try_recv() {
            uris.push(d.uri);
        }
        uris.sort();
        assert_eq!(uris, vec!["a1", "a2", "b1"]);
    }
}
