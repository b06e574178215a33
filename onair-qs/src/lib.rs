//! # OnAir Queue Scheduler (onair-qs)
//!
//! Per-station broadcast queue: stores upcoming and played entries, hands
//! exactly one entry at a time to the AutoDJ engine, records playback
//! confirmations and purges old history. Also tracks which stations need a
//! restart after configuration changes.

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod queue;
pub mod state;
pub mod station;

pub use error::{Error, Result};
pub use state::SharedState;
