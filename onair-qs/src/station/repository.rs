//! Station persistence and configuration changes
//!
//! Every configuration write goes through [`StationRepository::apply`], which
//! is the one place that knows which settings require the broadcast
//! processes to be restarted.

use super::model::{BackendAdapter, FrontendAdapter, NewStation, Station, StationId};
use super::restart::{station_not_found, RestartFlagTracker, HAS_LOCAL_SERVICES};
use crate::error::{Error, Result};
use onair_common::db::StationRow;
use onair_common::events::{EventBus, RestartReason};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

const STATION_COLUMNS: &str = "id, name, short_name, description, is_enabled, frontend_type, \
     backend_type, frontend_config, backend_config, url, enable_streamers, max_bitrate, \
     needs_restart, has_started";

/// One configuration change to a station
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigChange {
    Name(String),
    Description(Option<String>),
    Enabled(bool),
    FrontendType(FrontendAdapter),
    BackendType(BackendAdapter),
    ShortName(String),
    FrontendConfig(String),
    BackendConfig(String),
    Url(Option<String>),
    EnableStreamers(bool),
    MaxBitrate(i64),
}

impl ConfigChange {
    /// Reason recorded when this change lands on a running station
    pub fn restart_reason(&self) -> Option<RestartReason> {
        match self {
            ConfigChange::ShortName(_) => Some(RestartReason::ShortNameChanged),
            ConfigChange::FrontendConfig(_) => Some(RestartReason::FrontendConfigChanged),
            ConfigChange::BackendConfig(_) => Some(RestartReason::BackendConfigChanged),
            ConfigChange::Url(_) => Some(RestartReason::UrlChanged),
            ConfigChange::EnableStreamers(_) => Some(RestartReason::StreamersToggled),
            ConfigChange::MaxBitrate(_) => Some(RestartReason::MaxBitrateChanged),
            ConfigChange::Name(_)
            | ConfigChange::Description(_)
            | ConfigChange::Enabled(_)
            | ConfigChange::FrontendType(_)
            | ConfigChange::BackendType(_) => None,
        }
    }

    /// Changes that can flip `has_local_services()`
    fn affects_local_services(&self) -> bool {
        matches!(
            self,
            ConfigChange::Enabled(_) | ConfigChange::FrontendType(_) | ConfigChange::BackendType(_)
        )
    }

    fn column(&self) -> &'static str {
        match self {
            ConfigChange::Name(_) => "name",
            ConfigChange::Description(_) => "description",
            ConfigChange::Enabled(_) => "is_enabled",
            ConfigChange::FrontendType(_) => "frontend_type",
            ConfigChange::BackendType(_) => "backend_type",
            ConfigChange::ShortName(_) => "short_name",
            ConfigChange::FrontendConfig(_) => "frontend_config",
            ConfigChange::BackendConfig(_) => "backend_config",
            ConfigChange::Url(_) => "url",
            ConfigChange::EnableStreamers(_) => "enable_streamers",
            ConfigChange::MaxBitrate(_) => "max_bitrate",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            ConfigChange::ShortName(s) if s.trim().is_empty() => {
                Err(Error::Validation("short name cannot be empty".to_string()))
            }
            ConfigChange::Name(s) if s.trim().is_empty() => {
                Err(Error::Validation("station name cannot be empty".to_string()))
            }
            ConfigChange::MaxBitrate(b) if *b < 0 => {
                Err(Error::Validation(format!("invalid max bitrate: {}", b)))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct StationRepository {
    db: Pool<Sqlite>,
    restart: RestartFlagTracker,
}

impl StationRepository {
    pub fn new(db: Pool<Sqlite>, events: EventBus) -> Self {
        let restart = RestartFlagTracker::new(db.clone(), events);
        Self { db, restart }
    }

    pub fn restart_tracker(&self) -> &RestartFlagTracker {
        &self.restart
    }

    /// Insert a station; stations without local services start out as started
    pub async fn create(&self, new_station: NewStation) -> Result<Station> {
        ConfigChange::Name(new_station.name.clone()).validate()?;
        ConfigChange::ShortName(new_station.short_name.clone()).validate()?;

        let sql = format!(
            "INSERT INTO stations (name, short_name, description, is_enabled, frontend_type, backend_type, has_started) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0) RETURNING {}",
            STATION_COLUMNS
        );
        let row = sqlx::query_as::<_, StationRow>(&sql)
            .bind(&new_station.name)
            .bind(new_station.short_name.trim())
            .bind(&new_station.description)
            .bind(new_station.is_enabled)
            .bind(new_station.frontend_type.as_str())
            .bind(new_station.backend_type.as_str())
            .fetch_one(&self.db)
            .await
            .map_err(|e| unique_to_validation(e, &new_station.short_name))?;

        self.restart.reconcile(row.id).await?;
        info!("Created station {} ({})", row.id, row.short_name);
        self.require(row.id).await
    }

    pub async fn get(&self, id: StationId) -> Result<Option<Station>> {
        let sql = format!("SELECT {} FROM stations WHERE id = ?", STATION_COLUMNS);
        sqlx::query_as::<_, StationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(Station::try_from)
            .transpose()
    }

    pub async fn require(&self, id: StationId) -> Result<Station> {
        self.get(id).await?.ok_or_else(|| station_not_found(id))
    }

    pub async fn list(&self) -> Result<Vec<Station>> {
        let sql = format!("SELECT {} FROM stations ORDER BY id", STATION_COLUMNS);
        sqlx::query_as::<_, StationRow>(&sql)
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(Station::try_from)
            .collect()
    }

    /// Stations whose broadcast processes should be running on this host
    pub async fn list_with_local_services(&self) -> Result<Vec<Station>> {
        let sql = format!(
            "SELECT {} FROM stations WHERE {} ORDER BY id",
            STATION_COLUMNS, HAS_LOCAL_SERVICES
        );
        sqlx::query_as::<_, StationRow>(&sql)
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(Station::try_from)
            .collect()
    }

    /// Apply one configuration change
    ///
    /// Restart-relevant changes flag the station only when the stored value
    /// actually changes.
    pub async fn apply(&self, id: StationId, change: ConfigChange) -> Result<Station> {
        change.validate()?;

        let sql = format!(
            "UPDATE stations SET {col} = ?1 WHERE id = ?2 AND {col} IS NOT ?1",
            col = change.column()
        );
        let query = sqlx::query(&sql);
        let query = match &change {
            ConfigChange::Name(v) | ConfigChange::FrontendConfig(v) | ConfigChange::BackendConfig(v) => {
                query.bind(v.clone())
            }
            ConfigChange::ShortName(v) => query.bind(v.trim().to_string()),
            ConfigChange::Description(v) | ConfigChange::Url(v) => query.bind(v.clone()),
            ConfigChange::Enabled(v) | ConfigChange::EnableStreamers(v) => query.bind(*v),
            ConfigChange::FrontendType(v) => query.bind(v.as_str()),
            ConfigChange::BackendType(v) => query.bind(v.as_str()),
            ConfigChange::MaxBitrate(v) => query.bind(*v),
        };

        let changed = query
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| match &change {
                ConfigChange::ShortName(v) => unique_to_validation(e, v),
                _ => Error::Database(e),
            })?
            .rows_affected();

        if changed == 0 {
            // Unknown station, or the value was already stored
            let station = self.require(id).await?;
            debug!("Station {}: {} unchanged", id, change.column());
            return Ok(station);
        }

        debug!("Station {}: {} updated", id, change.column());

        if change.affects_local_services() {
            self.restart.reconcile(id).await?;
        }
        if let Some(reason) = change.restart_reason() {
            self.restart.request_restart(id, reason).await?;
        }

        self.require(id).await
    }
}

fn unique_to_validation(e: sqlx::Error, short_name: &str) -> Error {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::Validation(format!("short name already in use: {}", short_name.trim()))
        }
        _ => Error::Database(e),
    }
}
