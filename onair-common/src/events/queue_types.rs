//! Queue type definitions shared by events and storage

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which producer cued a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Playlist rotation
    Playlist,
    /// Direct media assignment
    Media,
    /// Listener request
    Request,
    /// Ad-hoc URI injected into AutoDJ
    CustomUri,
}

impl SourceKind {
    /// Value stored in `station_queue.source_kind`
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Playlist => "playlist",
            SourceKind::Media => "media",
            SourceKind::Request => "request",
            SourceKind::CustomUri => "custom_uri",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "playlist" => Ok(SourceKind::Playlist),
            "media" => Ok(SourceKind::Media),
            "request" => Ok(SourceKind::Request),
            "custom_uri" => Ok(SourceKind::CustomUri),
            other => Err(format!("Unknown queue source kind: {}", other)),
        }
    }
}

/// Why a station restart was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RestartReason {
    ShortNameChanged,
    FrontendConfigChanged,
    BackendConfigChanged,
    UrlChanged,
    StreamersToggled,
    MaxBitrateChanged,
    Manual,
}

impl std::fmt::Display for RestartReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestartReason::ShortNameChanged => write!(f, "ShortNameChanged"),
            RestartReason::FrontendConfigChanged => write!(f, "FrontendConfigChanged"),
            RestartReason::BackendConfigChanged => write!(f, "BackendConfigChanged"),
            RestartReason::UrlChanged => write!(f, "UrlChanged"),
            RestartReason::StreamersToggled => write!(f, "StreamersToggled"),
            RestartReason::MaxBitrateChanged => write!(f, "MaxBitrateChanged"),
            RestartReason::Manual => write!(f, "Manual"),
        }
    }
}
