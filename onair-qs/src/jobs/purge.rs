//! History purge job
//!
//! Periodically deletes played entries older than the retention window on
//! every station. Purging never takes the dispatch lock; it only touches
//! played rows.

use crate::queue::QueueScheduler;
use onair_common::time;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

pub struct PurgeJob {
    scheduler: Arc<QueueScheduler>,
    period: Duration,
}

impl PurgeJob {
    pub fn new(scheduler: Arc<QueueScheduler>, period: Duration) -> Self {
        Self { scheduler, period }
    }

    /// One purge pass; returns the number of entries removed
    pub async fn run_once(&self) -> u64 {
        match self.scheduler.purge_all_history(time::now()).await {
            Ok(removed) => {
                debug!("History purge removed {} entries", removed);
                removed
            }
            Err(e) => {
                error!("History purge failed: {}", e);
                0
            }
        }
    }

    /// Spawn the periodic task; the first pass runs immediately
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        info!("Starting history purge (every {}s)", self.period.as_secs());

        tokio::spawn(async move {
            let mut timer = interval(self.period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        self.run_once().await;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("History purge stopped");
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
    use crate::jobs::shutdown_channel;
    use crate::queue::{LoggingNotifier, NewQueueEntry, QueueStore};
    use onair_common::db::init_memory_database;
    use onair_common::events::EventBus;

    async fn setup() -> Arc<QueueScheduler> {
        let db = init_memory_database().await.unwrap();
        sqlx::query("INSERT INTO stations (id, name, short_name) VALUES (1, 'A', 'a'), (2, 'B', 'b')")
            .execute(&db)
            .await
            .unwrap();
        Arc::new(QueueScheduler::new(
            QueueStore::with_sqlite_catalog(db),
            Arc::new(LoggingNotifier),
            EventBus::new(16),
            &SchedulerSettings::default(),
        ))
    }

    #[tokio::test]
    async fn test_run_once_purges_all_stations() {
        let scheduler = setup().await;
        let long_ago = time::now() - chrono::Duration::days(30);

        for station in [1, 2] {
            let entry = scheduler
                .cue(NewQueueEntry::custom_uri(station, "http://relay/old"))
                .await
                .unwrap();
            scheduler.on_playback_confirmed(entry.id, long_ago).await.unwrap();
        }
        let upcoming = scheduler
            .cue(NewQueueEntry::custom_uri(1, "http://relay/next"))
            .await
            .unwrap();

        let job = PurgeJob::new(scheduler.clone(), Duration::from_secs(3600));
        assert_eq!(job.run_once().await, 2);
        assert!(scheduler.store().get(upcoming.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_spawned_job_stops_on_shutdown() {
        let scheduler = setup().await;
        let (tx, rx) = shutdown_channel();

        let handle = PurgeJob::new(scheduler, Duration::from_millis(10)).spawn(rx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
