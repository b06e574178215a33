//! Station model
//!
//! Only the fields the queue and the restart tracker care about.

use crate::error::{Error, Result};
use onair_common::db::StationRow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use crate::queue::StationId;

/// Public broadcast frontend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontendAdapter {
    Icecast,
    Shoutcast,
    /// Broadcasts to a relay managed elsewhere; nothing runs locally
    Remote,
}

impl FrontendAdapter {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrontendAdapter::Icecast => "icecast",
            FrontendAdapter::Shoutcast => "shoutcast",
            FrontendAdapter::Remote => "remote",
        }
    }

    /// True when the frontend is a local process
    pub fn is_enabled(&self) -> bool {
        !matches!(self, FrontendAdapter::Remote)
    }
}

impl fmt::Display for FrontendAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrontendAdapter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "icecast" => Ok(FrontendAdapter::Icecast),
            "shoutcast" => Ok(FrontendAdapter::Shoutcast),
            "remote" => Ok(FrontendAdapter::Remote),
            other => Err(Error::Validation(format!("unknown frontend type: {}", other))),
        }
    }
}

/// AutoDJ backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendAdapter {
    Liquidsoap,
    None,
}

impl BackendAdapter {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendAdapter::Liquidsoap => "liquidsoap",
            BackendAdapter::None => "none",
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, BackendAdapter::None)
    }
}

impl fmt::Display for BackendAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendAdapter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "liquidsoap" => Ok(BackendAdapter::Liquidsoap),
            "none" => Ok(BackendAdapter::None),
            other => Err(Error::Validation(format!("unknown backend type: {}", other))),
        }
    }
}

/// A broadcast station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub short_name: String,
    pub description: Option<String>,
    pub is_enabled: bool,
    pub frontend_type: FrontendAdapter,
    pub backend_type: BackendAdapter,
    /// Opaque JSON
    pub frontend_config: String,
    /// Opaque JSON
    pub backend_config: String,
    pub url: Option<String>,
    pub enable_streamers: bool,
    pub max_bitrate: i64,
    pub needs_restart: bool,
    pub has_started: bool,
}

impl Station {
    /// Whether any broadcast process for this station runs on this host
    pub fn has_local_services(&self) -> bool {
        self.is_enabled && (self.backend_type.is_enabled() || self.frontend_type.is_enabled())
    }
}

impl TryFrom<StationRow> for Station {
    type Error = Error;

    fn try_from(row: StationRow) -> Result<Self> {
        Ok(Station {
            id: row.id,
            name: row.name,
            short_name: row.short_name,
            description: row.description,
            is_enabled: row.is_enabled,
            frontend_type: row.frontend_type.parse()?,
            backend_type: row.backend_type.parse()?,
            frontend_config: row.frontend_config,
            backend_config: row.backend_config,
            url: row.url,
            enable_streamers: row.enable_streamers,
            max_bitrate: row.max_bitrate,
            needs_restart: row.needs_restart,
            has_started: row.has_started,
        })
    }
}

/// Station to be created
#[derive(Debug, Clone, PartialEq)]
pub struct NewStation {
    pub name: String,
    pub short_name: String,
    pub description: Option<String>,
    pub is_enabled: bool,
    pub frontend_type: FrontendAdapter,
    pub backend_type: BackendAdapter,
}

impl NewStation {
    /// Enabled station with a local Icecast + Liquidsoap pair
    pub fn new(name: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short_name: short_name.into(),
            description: None,
            is_enabled: true,
            frontend_type: FrontendAdapter::Icecast,
            backend_type: BackendAdapter::Liquidsoap,
        }
    }

    pub fn adapters(mut self, frontend: FrontendAdapter, backend: BackendAdapter) -> Self {
        self.frontend_type = frontend;
        self.backend_type = backend;
        self
    }

    pub fn enabled(mut self, is_enabled: bool) -> Self {
        self.is_enabled = is_enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(enabled: bool, frontend: FrontendAdapter, backend: BackendAdapter) -> Station {
        Station {
            id: 1,
            name: "Test FM".to_string(),
            short_name: "test_fm".to_string(),
            description: None,
            is_enabled: enabled,
            frontend_type: frontend,
            backend_type: backend,
            frontend_config: "{}".to_string(),
            backend_config: "{}".to_string(),
            url: None,
            enable_streamers: false,
            max_bitrate: 0,
            needs_restart: false,
            has_started: false,
        }
    }

    #[test]
    fn test_has_local_services() {
        use BackendAdapter as B;
        use FrontendAdapter as F;

        assert!(station(true, F::Icecast, B::Liquidsoap).has_local_services());
        assert!(station(true, F::Remote, B::Liquidsoap).has_local_services());
        assert!(station(true, F::Shoutcast, B::None).has_local_services());
        assert!(!station(true, F::Remote, B::None).has_local_services());
        assert!(!station(false, F::Icecast, B::Liquidsoap).has_local_services());
    }

    #[test]
    fn test_adapter_parsing() {
        assert_eq!("remote".parse::<FrontendAdapter>().unwrap(), FrontendAdapter::Remote);
        assert_eq!("none".parse::<BackendAdapter>().unwrap(), BackendAdapter::None);
        assert!(matches!(
            "winamp".parse::<FrontendAdapter>(),
            Err(Error::Validation(_))
        ));
    }
}
