//! Database access layer
//!
//! Queue and station queries live next to their domain types in `queue`
//! and `station`; this module holds settings access.

pub mod settings;
