//! Background tasks
//!
//! Both loops run until the shutdown channel flips to `true`.

pub mod dispatch;
pub mod purge;

pub use dispatch::DispatchLoop;
pub use purge::PurgeJob;

use tokio::sync::watch;

/// Sender half used by `main` to stop every background task
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}
