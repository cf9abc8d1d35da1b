use std::fs;

use syncd_core::config::{self, config_path_at};
use syncd_core::{ConfigError, DedupStrategy, EngineConfig};
use tempfile::TempDir;

#[test]
fn missing_file_yields_defaults() {
    let home = TempDir::new().expect("home");
    let loaded = config::load_at(&config_path_at(home.path())).expect("load");
    assert_eq!(loaded, EngineConfig::default());
}

#[test]
fn partial_yaml_keeps_defaults_for_absent_fields() {
    let home = TempDir::new().expect("home");
    let path = config_path_at(home.path());
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(
        &path,
        "processor:\n  batch_size: 25\n  dedup:\n    strategy: content_window\n    window_ms: 250\n",
    )
    .expect("write");

    let loaded = config::load_at(&path).expect("load");
    assert_eq!(loaded.processor.batch_size, 25);
    assert_eq!(loaded.processor.dedup.strategy, DedupStrategy::ContentWindow);
    assert_eq!(loaded.processor.dedup.window_ms, 250);
    assert_eq!(loaded.processor.max_queue_size, 1000);
    assert_eq!(loaded.state.max_version_history, 50);
}

#[test]
fn save_then_load_preserves_config() {
    let home = TempDir::new().expect("home");
    let path = config_path_at(home.path());
    let mut cfg = EngineConfig::default();
    cfg.processor.enable_batching = false;
    cfg.state.persist_state = true;

    config::save_at(&path, &cfg).expect("save");
    assert!(
        !path.with_extension("yaml.tmp").exists(),
        "tmp file should be renamed away"
    );
    let loaded = config::load_at(&path).expect("load");
    assert_eq!(loaded, cfg);
}

#[test]
fn malformed_yaml_reports_path() {
    let home = TempDir::new().expect("home");
    let path = config_path_at(home.path());
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, "processor: [not, a, map").expect("write");

    match config::load_at(&path) {
        Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn invalid_values_are_rejected_on_load() {
    let home = TempDir::new().expect("home");
    let path = config_path_at(home.path());
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, "processor:\n  max_queue_size: 0\n").expect("write");

    assert!(matches!(
        config::load_at(&path),
        Err(ConfigError::Invalid(_))
    ));
}
