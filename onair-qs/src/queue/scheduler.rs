//! Queue Scheduler
//!
//! Single authority deciding which entry goes to AutoDJ next, and the
//! receiver of playback confirmations.
//!
//! At most one entry per station is in flight (sent but not played). The
//! guarantee has two layers: a per-station async mutex serializes
//! dispatchers inside this process, and [`QueueStore::claim_for_dispatch`]
//! is a database compare-and-set that holds across processes.

use super::entry::{EntryId, NewQueueEntry, QueueEntry, StationId};
use super::notifier::ExternalNotifier;
use super::store::QueueStore;
use crate::db::settings::SchedulerSettings;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use onair_common::events::{EventBus, OnAirEvent};
use onair_common::time;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of one dispatch attempt for a station
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Entry claimed and handed to AutoDJ
    Dispatched(QueueEntry),
    /// Another entry is still playing; nothing was dispatched
    InFlight(QueueEntry),
    /// Nothing waiting
    Idle,
}

pub struct QueueScheduler {
    store: QueueStore,
    notifier: Arc<dyn ExternalNotifier>,
    events: EventBus,
    station_locks: Mutex<HashMap<StationId, Arc<Mutex<()>>>>,
    retry_limit: u32,
    retry_backoff: Duration,
    retention_days: i64,
}

impl QueueScheduler {
    pub fn new(
        store: QueueStore,
        notifier: Arc<dyn ExternalNotifier>,
        events: EventBus,
        settings: &SchedulerSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            events,
            station_locks: Mutex::new(HashMap::new()),
            retry_limit: settings.dispatch_retry_limit.max(1),
            retry_backoff: settings.dispatch_retry_backoff,
            retention_days: settings.history_retention_days,
        }
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Cue an entry and announce it
    pub async fn cue(&self, new_entry: NewQueueEntry) -> Result<QueueEntry> {
        let id = self.store.insert(new_entry).await?;
        let entry = self.store.require(id).await?;

        self.events.emit_lossy(OnAirEvent::EntryCued {
            station_id: entry.station_id,
            entry_id: entry.id,
            source: entry.source.kind(),
            timestamp: entry.timestamp_cued,
        });
        Ok(entry)
    }

    /// Earliest upcoming entry not yet sent to AutoDJ
    pub async fn next_for_station(&self, station_id: StationId) -> Result<Option<QueueEntry>> {
        self.store.next_unsent(station_id).await
    }

    /// Pick and claim the next entry for a station
    ///
    /// Lost compare-and-set races are retried with exponential backoff up to
    /// the configured limit, then surface as `Contention`.
    pub async fn dispatch_next(&self, station_id: StationId) -> Result<DispatchOutcome> {
        let lock = self.station_lock(station_id).await;
        let _guard = lock.lock().await;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            if let Some(playing) = self.store.in_flight(station_id).await? {
                return Ok(DispatchOutcome::InFlight(playing));
            }

            let Some(next) = self.next_for_station(station_id).await? else {
                return Ok(DispatchOutcome::Idle);
            };

            match self.store.claim_for_dispatch(station_id, next.id).await {
                Ok(entry) => {
                    info!(
                        "Dispatching entry {} ({}) on station {}",
                        entry.id,
                        entry.display_name(),
                        station_id
                    );
                    self.notify(&entry).await;
                    return Ok(DispatchOutcome::Dispatched(entry));
                }
                // Entry removed between pick and claim
                Err(Error::NotFound(_)) if attempt < self.retry_limit => {
                    debug!("Entry {} vanished before dispatch, retrying", next.id);
                }
                Err(e) if e.is_transient() && attempt < self.retry_limit => {
                    debug!(
                        "Dispatch race on station {} (attempt {}/{}), retrying",
                        station_id, attempt, self.retry_limit
                    );
                    tokio::time::sleep(backoff_delay(self.retry_backoff, attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// AutoDJ took an entry on its own (pull path)
    ///
    /// Marks the entry sent and notifies once; repeated calls are no-ops.
    /// Fails with `Contention` while another entry of the station is in
    /// flight.
    pub async fn on_dispatched(&self, entry_id: EntryId) -> Result<QueueEntry> {
        let station_id = self.store.require(entry_id).await?.station_id;
        let lock = self.station_lock(station_id).await;
        let _guard = lock.lock().await;

        let changed = self.store.mark_sent_to_autodj(entry_id).await?;
        let entry = self.store.require(entry_id).await?;

        if changed {
            self.notify(&entry).await;
        } else {
            debug!("Entry {} already dispatched", entry_id);
        }
        Ok(entry)
    }

    /// AutoDJ reports that an entry played
    ///
    /// Never fails for a known entry: the audio already went out. Entries
    /// that were never dispatched are still marked played; entries already
    /// played are left unchanged. Both cases are logged as anomalies.
    pub async fn on_playback_confirmed(
        &self,
        entry_id: EntryId,
        played_at: DateTime<Utc>,
    ) -> Result<QueueEntry> {
        let entry = self.store.require(entry_id).await?;

        if entry.is_played {
            warn!(
                "Duplicate playback confirmation for entry {} on station {}",
                entry_id, entry.station_id
            );
            self.emit_late(&entry, true);
            return Ok(entry);
        }

        if !entry.sent_to_autodj {
            warn!(
                "Late playback confirmation: entry {} on station {} was never dispatched",
                entry_id, entry.station_id
            );
            self.emit_late(&entry, false);
        }

        match self.store.mark_played(entry_id, played_at).await {
            Ok(played) => {
                info!(
                    "Entry {} ({}) played on station {}",
                    played.id,
                    played.display_name(),
                    played.station_id
                );
                self.events.emit_lossy(OnAirEvent::EntryPlayed {
                    station_id: played.station_id,
                    entry_id: played.id,
                    played_at,
                });
                Ok(played)
            }
            Err(Error::InvalidTransition { .. }) => {
                // Another confirmation won the race
                warn!("Entry {} confirmed concurrently", entry_id);
                self.emit_late(&entry, true);
                self.store.require(entry_id).await
            }
            Err(e) => Err(e),
        }
    }

    /// Move an entry to another playlist and refresh its visibility
    pub async fn on_playlist_reassigned(
        &self,
        entry_id: EntryId,
        playlist_id: i64,
    ) -> Result<QueueEntry> {
        self.store.reassign_playlist(entry_id, playlist_id).await?;
        let is_visible = self.store.recompute_visibility(entry_id).await?;
        debug!(
            "Entry {} moved to playlist {} (visible: {})",
            entry_id, playlist_id, is_visible
        );
        self.store.require(entry_id).await
    }

    /// Remove an upcoming entry that has not been dispatched
    pub async fn remove(&self, entry_id: EntryId) -> Result<QueueEntry> {
        let removed = self.store.remove(entry_id).await?;
        self.events.emit_lossy(OnAirEvent::EntryRemoved {
            station_id: removed.station_id,
            entry_id,
            timestamp: time::now(),
        });
        Ok(removed)
    }

    /// Purge one station's history older than the retention window
    pub async fn purge_history(&self, station_id: StationId, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = time::retention_cutoff(now, self.retention_days);
        let removed = self.store.purge_older_than(station_id, cutoff).await?;
        self.emit_purged(Some(station_id), removed, cutoff);
        Ok(removed)
    }

    /// Purge every station's history older than the retention window
    pub async fn purge_all_history(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = time::retention_cutoff(now, self.retention_days);
        let removed = self.store.purge_all_older_than(cutoff).await?;
        self.emit_purged(None, removed, cutoff);
        Ok(removed)
    }

    /// Fire-and-forget hand-off; failures are logged, never retried
    async fn notify(&self, entry: &QueueEntry) {
        let uri = match self.store.audio_uri(entry).await {
            Ok(uri) => uri,
            Err(e) => {
                warn!("Could not resolve audio for entry {}: {}", entry.id, e);
                String::new()
            }
        };

        if let Err(e) = self
            .notifier
            .notify_dispatched(entry.station_id, entry.id, &uri)
            .await
        {
            warn!(
                "AutoDJ notification for entry {} on station {} failed: {}",
                entry.id, entry.station_id, e
            );
        }

        self.events.emit_lossy(OnAirEvent::EntryDispatched {
            station_id: entry.station_id,
            entry_id: entry.id,
            uri,
            timestamp: time::now(),
        });
    }

    fn emit_late(&self, entry: &QueueEntry, already_played: bool) {
        self.events.emit_lossy(OnAirEvent::LateConfirmation {
            station_id: entry.station_id,
            entry_id: entry.id,
            already_played,
            timestamp: time::now(),
        });
    }

    fn emit_purged(&self, station_id: Option<StationId>, removed: u64, cutoff: DateTime<Utc>) {
        if removed == 0 {
            return;
        }
        info!(
            "Purged {} played entries older than {}",
            removed,
            cutoff.to_rfc3339()
        );
        self.events.emit_lossy(OnAirEvent::HistoryPurged {
            station_id,
            removed,
            cutoff,
        });
    }

    /// Per-station lock; entries no caller holds are pruned on each lookup.
    async fn station_lock(&self, station_id: StationId) -> Arc<Mutex<()>> {
        let mut locks = self.station_locks.lock().await;
        locks.retain(|id, lock| *id == station_id || Arc::strong_count(lock) > 1);
        locks
            .entry(station_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Exponential backoff with up to 50% jitter
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let base = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let exp = base.saturating_mul(1u64 << attempt.saturating_sub(1).min(10));
    let jitter = if base > 0 {
        rand::thread_rng().gen_range(0..=base / 2)
    } else {
        0
    };
    Duration::from_millis(exp.saturating_add(jitter))
}
