//! Database row models
//!
//! Raw column values as stored; the scheduler converts them into typed
//! domain values.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

/// One row of the `stations` table
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StationRow {
    pub id: i64,
    pub name: String,
    pub short_name: String,
    pub description: Option<String>,
    pub is_enabled: bool,
    pub frontend_type: String,
    pub backend_type: String,
    pub frontend_config: String,
    pub backend_config: String,
    pub url: Option<String>,
    pub enable_streamers: bool,
    pub max_bitrate: i64,
    pub needs_restart: bool,
    pub has_started: bool,
}

/// One row of the `station_queue` table
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueRow {
    pub id: i64,
    pub station_id: i64,
    pub source_kind: String,
    pub playlist_id: Option<i64>,
    pub media_id: Option<i64>,
    pub request_id: Option<i64>,
    pub autodj_custom_uri: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub sent_to_autodj: bool,
    pub is_played: bool,
    pub is_visible: bool,
    /// Microseconds since the Unix epoch
    pub timestamp_cued: i64,
    /// Microseconds since the Unix epoch
    pub timestamp_played: Option<i64>,
    pub duration: Option<f64>,
}
