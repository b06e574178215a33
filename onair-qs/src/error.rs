//! Error types for onair-qs
//!
//! Every failure is scoped to a single entry or station; none is fatal to
//! the scheduler process.

use thiserror::Error;

/// Main error type for the queue scheduler
#[derive(Error, Debug)]
pub enum Error {
    /// Entry creation without provenance, or an illegal provenance change
    #[error("Validation error: {0}")]
    Validation(String),

    /// Lifecycle transition not allowed from the entry's current state
    #[error("Invalid transition for queue entry {entry_id}: {reason}")]
    InvalidTransition { entry_id: i64, reason: String },

    /// Unknown entry or station
    #[error("Not found: {0}")]
    NotFound(String),

    /// Dispatch compare-and-set lost the race; retry `next_for_station`
    #[error("Dispatch contention on station {station_id} (entry {entry_id})")]
    Contention { station_id: i64, entry_id: i64 },

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Settings loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors a caller is expected to retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Contention { .. })
    }
}

/// Convenience Result type using the onair-qs Error
pub type Result<T> = std::result::Result<T, Error>;
