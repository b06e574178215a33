//! Station broadcast queue
//!
//! Entries move through cued → sent to AutoDJ → played. The store persists
//! them; the scheduler decides what plays next.

pub mod entry;
pub mod notifier;
pub mod scheduler;
pub mod store;

pub use entry::{EntryId, Lifecycle, NewQueueEntry, QueueEntry, QueueSource, StationId};
pub use notifier::{ChannelNotifier, Dispatch, ExternalNotifier, LoggingNotifier};
pub use scheduler::{DispatchOutcome, QueueScheduler};
pub use store::QueueStore;
