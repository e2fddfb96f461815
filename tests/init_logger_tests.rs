use merkle_tree_sync::config::{Config, LogLevel, StorageType};
use merkle_tree_sync::{init, init_logging, MTError};
use serial_test::serial;
use std::fs;
use tempfile::tempdir;

fn write_config(dir: &std::path::Path, console: bool) -> std::path::PathBuf {
    let config_path = dir.join("cfg.toml");
    let mut cfg = Config::default();
    cfg.storage.storage_type = StorageType::Memory;
    cfg.storage.base_path = "".into();
    cfg.tree.height = 20;
    cfg.logging.console = console;
    cfg.logging.level = LogLevel::Debug;
    fs::write(&config_path, toml::to_string(&cfg).unwrap()).unwrap();
    config_path
}

#[test]
#[serial]
fn test_init_fails_when_logger_already_set() {
    // Pre-initialize logger
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempdir().unwrap();
    let config_path = write_config(dir.path(), true);
    let result = init(Some(config_path.to_str().unwrap()));
    assert!(matches!(result, Err(MTError::InvalidInput(_))));
    assert!(!init_logging(&Config::default().logging));
}

#[test]
#[serial]
fn test_init_without_console_logging_loads_config() {
    let dir = tempdir().unwrap();
    let config_path = write_config(dir.path(), false);
    let config = init(Some(config_path.to_str().unwrap())).unwrap();
    assert_eq!(config.tree.height, 20);
    assert_eq!(config.storage.storage_type, StorageType::Memory);
}

#[test]
#[serial]
fn test_init_rejects_invalid_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("bad.toml");
    fs::write(&config_path, "[tree]\nheight = 0\n").unwrap();
    assert!(matches!(
        init(Some(config_path.to_str().unwrap())),
        Err(MTError::ConfigError(_))
    ));
}

#[test]
#[serial]
fn test_init_without_file_applies_env_overrides() {
    let dir = tempdir().unwrap();
    let base_path = dir.path().join("tree");
    std::env::set_var("MT_TREE_HEIGHT", "14");
    std::env::set_var("MT_STORAGE_BASE_PATH", &base_path);
    std::env::set_var("MT_LOGGING_LEVEL", "off");

    let result = init(None);

    std::env::remove_var("MT_TREE_HEIGHT");
    std::env::remove_var("MT_STORAGE_BASE_PATH");
    std::env::remove_var("MT_LOGGING_LEVEL");

    let config = result.unwrap();
    assert_eq!(config.tree.height, 14);
    assert_eq!(config.storage.base_path, base_path.to_string_lossy());
    assert_eq!(config.logging.level, LogLevel::Off);
}
