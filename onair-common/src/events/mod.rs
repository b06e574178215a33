//! Event types for the OnAir event system
//!
//! Provides shared event definitions and the EventBus used by the queue
//! scheduler and the restart tracker.

mod queue_types;

pub use queue_types::{RestartReason, SourceKind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// OnAir event types
///
/// Events are broadcast via EventBus and serialize to tagged JSON for
/// anything that forwards them off-process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OnAirEvent {
    /// Entry inserted into a station's upcoming queue
    EntryCued {
        station_id: i64,
        entry_id: i64,
        source: SourceKind,
        timestamp: DateTime<Utc>,
    },

    /// Entry handed to AutoDJ
    EntryDispatched {
        station_id: i64,
        entry_id: i64,
        /// URI the engine was told to play (empty when unresolved)
        uri: String,
        timestamp: DateTime<Utc>,
    },

    /// AutoDJ confirmed that an entry played
    EntryPlayed {
        station_id: i64,
        entry_id: i64,
        played_at: DateTime<Utc>,
    },

    /// Playback confirmed for an entry that was never dispatched,
    /// or confirmed a second time
    LateConfirmation {
        station_id: i64,
        entry_id: i64,
        already_played: bool,
        timestamp: DateTime<Utc>,
    },

    /// Operator removed an upcoming entry
    EntryRemoved {
        station_id: i64,
        entry_id: i64,
        timestamp: DateTime<Utc>,
    },

    /// Played history older than the retention window was deleted
    HistoryPurged {
        /// None when the purge covered every station
        station_id: Option<i64>,
        removed: u64,
        cutoff: DateTime<Utc>,
    },

    /// Station flagged for a broadcast process restart
    RestartRequested {
        station_id: i64,
        reason: RestartReason,
        timestamp: DateTime<Utc>,
    },

    /// Station restart completed
    RestartCleared {
        station_id: i64,
        timestamp: DateTime<Utc>,
    },
}

impl OnAirEvent {
    /// Station the event belongs to, if any
    pub fn station_id(&self) -> Option<i64> {
        match self {
            OnAirEvent::EntryCued { station_id, .. }
            | OnAirEvent::EntryDispatched { station_id, .. }
            | OnAirEvent::EntryPlayed { station_id, .. }
            | OnAirEvent::LateConfirmation { station_id, .. }
            | OnAirEvent::EntryRemoved { station_id, .. }
            | OnAirEvent::RestartRequested { station_id, .. }
            | OnAirEvent::RestartCleared { station_id, .. } => Some(*station_id),
            OnAirEvent::HistoryPurged { station_id, .. } => *station_id,
        }
    }
}

/// Broadcast bus for [`OnAirEvent`]s
///
/// Backed by a tokio broadcast channel; slow subscribers lose the oldest
/// events rather than blocking emitters.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OnAirEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    ///
    /// ```
    /// use onair_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<OnAirEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, returning the number of subscribers that received it
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: OnAirEvent) -> Result<usize, broadcast::error::SendError<OnAirEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: OnAirEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
