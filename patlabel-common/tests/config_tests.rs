//! Bootstrap config loading and root folder resolution
//!
//! Tests touching PATLABEL_ROOT_FOLDER are marked #[serial].

use patlabel_common::config::{
    load_toml_config, resolve_root_folder, write_toml_config, TomlConfig, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_missing_config_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let config = load_toml_config(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config, TomlConfig::default());
    assert_eq!(config.export_name, "patterns.xml");
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_config_write_then_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/data/shop"));
    config.match_axis = "color".to_string();

    write_toml_config(&config, &path).unwrap();
    assert_eq!(load_toml_config(Some(&path)).unwrap(), config);
}

#[test]
fn test_partial_config_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "root_folder = \"/data/shop\"\n[logging]\nlevel = \"debug\"\n").unwrap();

    let config = load_toml_config(Some(&path)).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/data/shop")));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.attributes_file, PathBuf::from("__attributes.xml"));
}

#[test]
#[serial]
fn test_root_folder_priority() {
    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/from/config"));
    let fallback = Path::new("/from/fallback");

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(
        resolve_root_folder(Some(Path::new("/from/cli")), &config, fallback),
        PathBuf::from("/from/cli")
    );
    assert_eq!(resolve_root_folder(None, &config, fallback), PathBuf::from("/from/config"));

    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    assert_eq!(resolve_root_folder(None, &config, fallback), PathBuf::from("/from/env"));
    env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(
        resolve_root_folder(None, &TomlConfig::default(), fallback),
        PathBuf::from("/from/fallback")
    );
}
