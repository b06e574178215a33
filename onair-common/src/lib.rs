//! # OnAir Common Library
//!
//! Shared code for the OnAir station services:
//! - Database initialization and row models
//! - Event types (OnAirEvent enum) and the EventBus
//! - Configuration loading
//! - Timestamp helpers

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
