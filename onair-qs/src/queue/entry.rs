//! Queue entry domain types

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use onair_common::db::QueueRow;
use onair_common::events::SourceKind;
use onair_common::time;
use serde::{Deserialize, Serialize};

/// Queue entry identifier (auto-increment, insertion ordered)
pub type EntryId = i64;

/// Station identifier
pub type StationId = i64;

/// Provenance of a queue entry: exactly one producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueSource {
    /// Playlist rotation. Media is absent for remote-URL playlists.
    Playlist {
        playlist_id: i64,
        media_id: Option<i64>,
    },
    /// Direct media assignment
    Media { media_id: i64 },
    /// Listener request; media is absent until a track is attached
    Request {
        request_id: i64,
        media_id: Option<i64>,
    },
    /// Ad-hoc URI injected into AutoDJ
    CustomUri { uri: String },
}

impl QueueSource {
    /// Build a source from nullable provenance fields
    ///
    /// Fails with `Validation` when nothing is set, or when the combination
    /// does not name a single producer.
    pub fn from_parts(
        playlist_id: Option<i64>,
        media_id: Option<i64>,
        request_id: Option<i64>,
        custom_uri: Option<String>,
    ) -> Result<Self> {
        let custom_uri = custom_uri.filter(|uri| !uri.trim().is_empty());

        let source = match (playlist_id, media_id, request_id, custom_uri) {
            (None, None, None, None) => {
                return Err(Error::Validation(
                    "queue entry needs a playlist, media, request or custom URI".to_string(),
                ))
            }
            (Some(playlist_id), media_id, None, None) => QueueSource::Playlist {
                playlist_id,
                media_id,
            },
            (None, Some(media_id), None, None) => QueueSource::Media { media_id },
            (None, media_id, Some(request_id), None) => QueueSource::Request {
                request_id,
                media_id,
            },
            (None, None, None, Some(uri)) => QueueSource::CustomUri { uri },
            _ => {
                return Err(Error::Validation(
                    "queue entry provenance must name exactly one producer".to_string(),
                ))
            }
        };

        Ok(source)
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            QueueSource::Playlist { .. } => SourceKind::Playlist,
            QueueSource::Media { .. } => SourceKind::Media,
            QueueSource::Request { .. } => SourceKind::Request,
            QueueSource::CustomUri { .. } => SourceKind::CustomUri,
        }
    }

    pub fn playlist_id(&self) -> Option<i64> {
        match self {
            QueueSource::Playlist { playlist_id, .. } => Some(*playlist_id),
            _ => None,
        }
    }

    pub fn media_id(&self) -> Option<i64> {
        match self {
            QueueSource::Playlist { media_id, .. } | QueueSource::Request { media_id, .. } => {
                *media_id
            }
            QueueSource::Media { media_id } => Some(*media_id),
            QueueSource::CustomUri { .. } => None,
        }
    }

    pub fn request_id(&self) -> Option<i64> {
        match self {
            QueueSource::Request { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }

    pub fn custom_uri(&self) -> Option<&str> {
        match self {
            QueueSource::CustomUri { uri } => Some(uri),
            _ => None,
        }
    }

    /// Reject sources that cannot be persisted
    pub fn validate(&self) -> Result<()> {
        match self {
            QueueSource::CustomUri { uri } if uri.trim().is_empty() => Err(Error::Validation(
                "custom URI must not be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Source after moving the entry to another playlist
    ///
    /// Media follows the entry. Listener requests and custom URIs keep
    /// their attribution and cannot be reassigned.
    pub fn reassigned_to(&self, new_playlist_id: i64) -> Result<Self> {
        match self {
            QueueSource::Playlist { media_id, .. } => Ok(QueueSource::Playlist {
                playlist_id: new_playlist_id,
                media_id: *media_id,
            }),
            QueueSource::Media { media_id } => Ok(QueueSource::Playlist {
                playlist_id: new_playlist_id,
                media_id: Some(*media_id),
            }),
            QueueSource::Request { request_id, .. } => Err(Error::Validation(format!(
                "entry cued from request {} cannot be moved to a playlist",
                request_id
            ))),
            QueueSource::CustomUri { .. } => Err(Error::Validation(
                "custom URI entries cannot be moved to a playlist".to_string(),
            )),
        }
    }

    fn from_columns(
        kind: &str,
        playlist_id: Option<i64>,
        media_id: Option<i64>,
        request_id: Option<i64>,
        custom_uri: Option<String>,
    ) -> Result<Self> {
        let kind: SourceKind = kind.parse().map_err(Error::Internal)?;
        let corrupt = || Error::Internal(format!("queue row has inconsistent {} provenance", kind));

        match kind {
            SourceKind::Playlist => Ok(QueueSource::Playlist {
                playlist_id: playlist_id.ok_or_else(corrupt)?,
                media_id,
            }),
            SourceKind::Media => Ok(QueueSource::Media {
                media_id: media_id.ok_or_else(corrupt)?,
            }),
            SourceKind::Request => Ok(QueueSource::Request {
                request_id: request_id.ok_or_else(corrupt)?,
                media_id,
            }),
            SourceKind::CustomUri => Ok(QueueSource::CustomUri {
                uri: custom_uri.ok_or_else(corrupt)?,
            }),
        }
    }
}

/// Visibility rule: entries from jingle playlists stay out of public history
pub fn visibility_for(source: &QueueSource, playlist_is_jingle: bool) -> bool {
    !(source.playlist_id().is_some() && playlist_is_jingle)
}

/// Lifecycle position derived from the two monotonic flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Cued,
    SentToAutodj,
    Played,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifecycle::Cued => write!(f, "cued"),
            Lifecycle::SentToAutodj => write!(f, "sent"),
            Lifecycle::Played => write!(f, "played"),
        }
    }
}

/// One scheduled or played unit of audio for one station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,
    pub station_id: StationId,
    pub source: QueueSource,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub sent_to_autodj: bool,
    pub is_played: bool,
    pub is_visible: bool,
    pub timestamp_cued: DateTime<Utc>,
    pub timestamp_played: Option<DateTime<Utc>>,
    /// Seconds
    pub duration: Option<f64>,
}

impl QueueEntry {
    pub fn lifecycle(&self) -> Lifecycle {
        if self.is_played {
            Lifecycle::Played
        } else if self.sent_to_autodj {
            Lifecycle::SentToAutodj
        } else {
            Lifecycle::Cued
        }
    }

    /// Dispatched to AutoDJ but not yet confirmed played
    pub fn is_in_flight(&self) -> bool {
        self.sent_to_autodj && !self.is_played
    }

    /// Human readable label for logs and the CLI
    pub fn display_name(&self) -> String {
        match (&self.artist, &self.title) {
            (Some(artist), Some(title)) => format!("{} - {}", artist, title),
            (None, Some(title)) => title.clone(),
            _ => match &self.source {
                QueueSource::CustomUri { uri } => uri.clone(),
                QueueSource::Request {
                    request_id,
                    media_id: None,
                } => format!("request #{}", request_id),
                other => match other.media_id() {
                    Some(media_id) => format!("media #{}", media_id),
                    None => format!("entry #{}", self.id),
                },
            },
        }
    }
}

impl TryFrom<QueueRow> for QueueEntry {
    type Error = Error;

    fn try_from(row: QueueRow) -> Result<Self> {
        let source = QueueSource::from_columns(
            &row.source_kind,
            row.playlist_id,
            row.media_id,
            row.request_id,
            row.autodj_custom_uri,
        )?;

        Ok(Self {
            id: row.id,
            station_id: row.station_id,
            source,
            title: row.title,
            artist: row.artist,
            sent_to_autodj: row.sent_to_autodj,
            is_played: row.is_played,
            is_visible: row.is_visible,
            timestamp_cued: time::from_micros(row.timestamp_cued),
            timestamp_played: row.timestamp_played.map(time::from_micros),
            duration: row.duration,
        })
    }
}

/// Entry to be cued
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueueEntry {
    pub station_id: StationId,
    pub source: QueueSource,
    /// Overrides the cue timestamp (defaults to now)
    pub cued_at: Option<DateTime<Utc>>,
}

impl NewQueueEntry {
    pub fn new(station_id: StationId, source: QueueSource) -> Self {
        Self {
            station_id,
            source,
            cued_at: None,
        }
    }

    pub fn from_playlist(station_id: StationId, playlist_id: i64, media_id: Option<i64>) -> Self {
        Self::new(
            station_id,
            QueueSource::Playlist {
                playlist_id,
                media_id,
            },
        )
    }

    pub fn from_media(station_id: StationId, media_id: i64) -> Self {
        Self::new(station_id, QueueSource::Media { media_id })
    }

    pub fn from_request(station_id: StationId, request_id: i64, media_id: Option<i64>) -> Self {
        Self::new(
            station_id,
            QueueSource::Request {
                request_id,
                media_id,
            },
        )
    }

    pub fn custom_uri(station_id: StationId, uri: impl Into<String>) -> Self {
        Self::new(station_id, QueueSource::CustomUri { uri: uri.into() })
    }

    pub fn cued_at(mut self, ts: DateTime<Utc>) -> Self {
        self.cued_at = Some(ts);
        self
    }
}
