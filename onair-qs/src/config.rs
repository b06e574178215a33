//! onair-qs specific configuration

use onair_common::config::{resolve_db_path, resolve_root_folder, TomlConfig, ROOT_FOLDER_ENV};
use std::path::{Path, PathBuf};

/// Filter used when neither RUST_LOG nor config.toml set one
pub const DEFAULT_LOG_FILTER: &str = "onair_qs=debug,onair_common=info";

/// Queue scheduler process configuration
///
/// Scheduler tunables are not here: they live in the database settings
/// table (see [`crate::db::settings::SchedulerSettings`]).
#[derive(Debug, Clone)]
pub struct Config {
    pub root_folder: PathBuf,
    pub db_path: PathBuf,
    pub log_filter: String,
}

impl Config {
    /// Resolve from command-line values, environment and config.toml
    pub fn resolve(root_arg: Option<&Path>, db_arg: Option<&Path>, toml: &TomlConfig) -> Self {
        let root_folder = resolve_root_folder(root_arg, ROOT_FOLDER_ENV, toml);
        let db_path = resolve_db_path(db_arg, &root_folder, toml);
        let log_filter = toml
            .log_filter
            .clone()
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Self {
            root_folder,
            db_path,
            log_filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_arguments_win() {
        let toml = TomlConfig::parse(
            r#"
            root_folder = "/srv/from-toml"
            database = "/srv/from-toml/queue.db"
            "#,
        )
        .unwrap();

        let config = Config::resolve(
            Some(Path::new("/srv/cli")),
            Some(Path::new("/tmp/cli.db")),
            &toml,
        );
        assert_eq!(config.root_folder, PathBuf::from("/srv/cli"));
        assert_eq!(config.db_path, PathBuf::from("/tmp/cli.db"));
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_db_defaults_inside_root() {
        let config = Config::resolve(Some(Path::new("/srv/radio")), None, &TomlConfig::default());
        assert_eq!(config.db_path, PathBuf::from("/srv/radio/onair.db"));
    }

    #[test]
    fn test_log_filter_from_toml() {
        let toml = TomlConfig::parse(r#"log_filter = "onair_qs=trace""#).unwrap();
        let config = Config::resolve(Some(Path::new("/srv/radio")), None, &toml);
        assert_eq!(config.log_filter, "onair_qs=trace");
    }

    #[test]
    #[serial_test::serial]
    fn test_env_root_used_without_cli() {
        let toml = TomlConfig::parse(r#"root_folder = "/srv/from-toml""#).unwrap();

        std::env::set_var(ROOT_FOLDER_ENV, "/srv/from-env");
        let config = Config::resolve(None, None, &toml);
        std::env::remove_var(ROOT_FOLDER_ENV);

        assert_eq!(config.root_folder, PathBuf::from("/srv/from-env"));
        assert_eq!(config.db_path, PathBuf::from("/srv/from-env/onair.db"));
    }
}
