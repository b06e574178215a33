//! Hand-off to the external AutoDJ engine
//!
//! Delivery is at-most-once: the scheduler calls the notifier once per
//! dispatch and never retries. The engine is expected to poll
//! `next_for_station` if a push is missed.

use super::entry::{EntryId, StationId};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

/// Receives "entry ready" notifications
#[async_trait]
pub trait ExternalNotifier: Send + Sync {
    /// Errors are logged by the caller and otherwise ignored
    async fn notify_dispatched(
        &self,
        station_id: StationId,
        entry_id: EntryId,
        resolved_uri: &str,
    ) -> anyhow::Result<()>;
}

/// Notifier that only writes a log line
#[derive(Debug, Default, Clone)]
pub struct LoggingNotifier;

#[async_trait]
impl ExternalNotifier for LoggingNotifier {
    async fn notify_dispatched(
        &self,
        station_id: StationId,
        entry_id: EntryId,
        resolved_uri: &str,
    ) -> anyhow::Result<()> {
        info!(
            "AutoDJ station {}: play entry {} ({})",
            station_id, entry_id, resolved_uri
        );
        Ok(())
    }
}

/// A dispatch as seen by an in-process engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub station_id: StationId,
    pub entry_id: EntryId,
    pub uri: String,
}

/// Notifier feeding an in-process engine through a channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Dispatch>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Dispatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ExternalNotifier for ChannelNotifier {
    async fn notify_dispatched(
        &self,
        station_id: StationId,
        entry_id: EntryId,
        resolved_uri: &str,
    ) -> anyhow::Result<()> {
        self.tx
            .send(Dispatch {
                station_id,
                entry_id,
                uri: resolved_uri.to_string(),
            })
            .map_err(|_| anyhow::anyhow!("AutoDJ receiver dropped"))
    }
}
