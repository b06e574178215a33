//! Stations and their restart state

pub mod model;
pub mod repository;
pub mod restart;

pub use model::{BackendAdapter, FrontendAdapter, NewStation, Station};
pub use repository::{ConfigChange, StationRepository};
pub use restart::RestartFlagTracker;
