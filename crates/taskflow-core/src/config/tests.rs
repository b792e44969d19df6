use super::*;

#[test]
fn test_defaults_match_documented_values() {
    let cfg = Config::default();
    assert_eq!(cfg.taskflow.name, "TaskFlow");
    assert_eq!(cfg.taskflow.data_dir, "~/.taskflow");
    assert_eq!(cfg.memory.path, "~/.taskflow/data/user_memory.json");
    assert_eq!(cfg.memory.max_conversation_history, 50);
    assert_eq!(cfg.memory.backup_retention_days, 7);
    assert!(cfg.scheduler.enabled);
    assert_eq!(cfg.scheduler.poll_interval(), Duration::from_secs(60));
    assert_eq!(cfg.rate_limit.max_requests, 10);
    assert_eq!(cfg.rate_limit.window(), Duration::from_secs(60));
    assert_eq!(cfg.timezone.zone().unwrap(), chrono_tz::Asia::Kolkata);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_partial_toml_fills_defaults() {
    let toml_str = r#"
        [scheduler]
        poll_interval_secs = 30

        [timezone]
        default_zone = "Europe/London"
    "#;
    let cfg: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(cfg.scheduler.poll_interval_secs, 30);
    assert!(cfg.scheduler.enabled);
    assert_eq!(cfg.memory.max_conversation_history, 50);
    assert_eq!(cfg.timezone.zone().unwrap(), chrono_tz::Europe::London);
}

#[test]
fn test_empty_toml_is_all_defaults() {
    let cfg: Config = toml::from_str("").unwrap();
    assert_eq!(cfg.taskflow.log_level, "info");
    assert_eq!(cfg.rate_limit.window_secs, 60);
}

#[test]
fn test_validate_rejects_unknown_zone() {
    let mut cfg = Config::default();
    cfg.timezone.default_zone = "Mars/Olympus".into();
    let err = cfg.validate().unwrap_err();
    assert!(matches!(err, TaskflowError::Config(_)));
}

#[test]
fn test_validate_rejects_zero_intervals() {
    let mut cfg = Config::default();
    cfg.scheduler.poll_interval_secs = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.rate_limit.max_requests = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("nope.toml");
    let cfg = load(path.to_str().unwrap()).unwrap();
    assert_eq!(cfg.scheduler.poll_interval_secs, 60);
}

#[test]
fn test_load_invalid_toml_is_config_error() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, "[scheduler\nenabled = ").unwrap();
    let err = load(path.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, TaskflowError::Config(_)));
}

#[test]
fn test_load_reads_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(
        &path,
        "[memory]\npath = \"/tmp/tf/user_memory.json\"\n\n[rate_limit]\nmax_requests = 3\n",
    )
    .unwrap();
    let cfg = load(path.to_str().unwrap()).unwrap();
    assert_eq!(cfg.memory.resolved_path(), PathBuf::from("/tmp/tf/user_memory.json"));
    assert_eq!(cfg.rate_limit.max_requests, 3);
}

#[test]
fn test_shellexpand_home() {
    let home = std::env::var("HOME").unwrap();
    assert_eq!(shellexpand("~/x/y"), format!("{home}/x/y"));
    assert_eq!(shellexpand("/abs/path"), "/abs/path");
}
