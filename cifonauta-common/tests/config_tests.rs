//! Tests for configuration loading and root folder resolution
//!
//! Tests touching CIFONAUTA_ROOT_FOLDER are marked #[serial] so they
//! never race on the process environment.

use cifonauta_common::config::{
    default_root_folder, RootFolderResolver, TomlConfig, DEFAULT_DATABASE_FILE,
    DEFAULT_WORMS_BASE_URL, ROOT_FOLDER_ENV,
};
use cifonauta_common::Error;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_defaults() {
    let config = TomlConfig::default();

    assert!(config.root_folder.is_none());
    assert_eq!(config.log_level, "info");
    assert_eq!(config.database_file, DEFAULT_DATABASE_FILE);
    assert_eq!(config.event_bus_capacity, 256);
    assert_eq!(config.worms.base_url, DEFAULT_WORMS_BASE_URL);
    assert_eq!(config.worms.timeout_secs, 30);
    assert_eq!(config.worms.max_attempts, 3);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let config = TomlConfig::from_toml_str(
        r#"
        log_level = "debug"

        [worms]
        max_attempts = 5
        "#,
    )
    .unwrap();

    assert_eq!(config.log_level, "debug");
    assert_eq!(config.worms.max_attempts, 5);
    assert_eq!(config.worms.timeout_secs, 30);
    assert_eq!(config.database_file, DEFAULT_DATABASE_FILE);
}

#[test]
fn test_malformed_file_is_config_error() {
    let result = TomlConfig::from_toml_str("log_level = [unclosed");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "root_folder = \"/srv/cifonauta\"\ndatabase_file = \"meta.db\"\n").unwrap();

    let config = TomlConfig::load(&path).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/cifonauta")));
    assert_eq!(
        config.database_path(Path::new("/srv/cifonauta")),
        PathBuf::from("/srv/cifonauta/meta.db")
    );
}

#[test]
fn test_load_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let result = TomlConfig::load(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);
    let config = TomlConfig::default();

    let root = RootFolderResolver::new(None, &config).resolve();
    assert_eq!(root, default_root_folder());
}

#[test]
#[serial]
fn test_resolver_priority() {
    let cli = PathBuf::from("/tmp/cifonauta-cli");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/cifonauta-toml")),
        ..Default::default()
    };

    env::set_var(ROOT_FOLDER_ENV, "/tmp/cifonauta-env");
    assert_eq!(
        RootFolderResolver::new(Some(&cli), &config).resolve(),
        cli,
        "command line wins over everything"
    );
    assert_eq!(
        RootFolderResolver::new(None, &config).resolve(),
        PathBuf::from("/tmp/cifonauta-env"),
        "environment wins over the config file"
    );

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(
        RootFolderResolver::new(None, &config).resolve(),
        PathBuf::from("/tmp/cifonauta-toml")
    );
}

#[test]
#[serial]
fn test_resolver_ignores_empty_env_var() {
    env::set_var(ROOT_FOLDER_ENV, "");
    let config = TomlConfig::default();

    let root = RootFolderResolver::new(None, &config).resolve();
    env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(root, default_root_folder());
}
