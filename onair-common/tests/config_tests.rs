//! Root folder and database path resolution
//!
//! Tests touching ONAIR_ROOT_FOLDER are marked #[serial] so they never race
//! on the process environment.

use onair_common::config::{resolve_db_path, resolve_root_folder, TomlConfig, ROOT_FOLDER_ENV};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

fn toml_with_root(root: &str) -> TomlConfig {
    TomlConfig::parse(&format!("root_folder = \"{}\"", root)).unwrap()
}

#[test]
#[serial]
fn test_cli_argument_beats_env_and_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let root = resolve_root_folder(Some(Path::new("/from/cli")), ROOT_FOLDER_ENV, &toml_with_root("/from/toml"));
    env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(root, PathBuf::from("/from/cli"));
}

#[test]
#[serial]
fn test_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let root = resolve_root_folder(None, ROOT_FOLDER_ENV, &toml_with_root("/from/toml"));
    env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(root, PathBuf::from("/from/env"));
}

#[test]
#[serial]
fn test_empty_env_is_ignored() {
    env::set_var(ROOT_FOLDER_ENV, "");
    let root = resolve_root_folder(None, ROOT_FOLDER_ENV, &toml_with_root("/from/toml"));
    env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(root, PathBuf::from("/from/toml"));
}

#[test]
#[serial]
fn test_falls_back_to_os_default() {
    env::remove_var(ROOT_FOLDER_ENV);
    let root = resolve_root_folder(None, ROOT_FOLDER_ENV, &TomlConfig::default());

    assert!(!root.as_os_str().is_empty());
    assert!(root.to_string_lossy().contains("onair"));
}

#[test]
fn test_db_path_defaults_into_root() {
    let db = resolve_db_path(None, Path::new("/srv/onair"), &TomlConfig::default());
    assert_eq!(db, PathBuf::from("/srv/onair/onair.db"));

    let toml = TomlConfig::parse("database = \"/data/queue.db\"").unwrap();
    assert_eq!(
        resolve_db_path(None, Path::new("/srv/onair"), &toml),
        PathBuf::from("/data/queue.db")
    );
}

#[test]
fn test_invalid_toml_is_config_error() {
    let err = TomlConfig::parse("root_folder = [").unwrap_err();
    assert!(matches!(err, onair_common::Error::Config(_)));
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "root_folder = \"/srv/radio\"\nlog_filter = \"onair_qs=trace\"\n").unwrap();

    let config = TomlConfig::load(&path).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/radio")));
    assert_eq!(config.log_filter.as_deref(), Some("onair_qs=trace"));

    assert!(TomlConfig::load(&dir.path().join("missing.toml")).is_err());
}
