use super::*;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_file(name: &str, content: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_nanos())
        .unwrap_or(0);
    let dir = std::env::temp_dir().join(format!("sumgr-config-{}-{nanos}", std::process::id()));
    fs::create_dir_all(&dir).expect("create temp dir");
    let path = dir.join(name);
    fs::write(&path, content).expect("write temp file");
    path
}

#[test]
fn normalize_should_fill_blank_fields() {
    let config = ManagerConfig {
        self_package: "   ".to_string(),
        helper_command: vec![" su ".to_string(), "".to_string(), "-c".to_string()],
        profiles_path: Some(PathBuf::new()),
        data_dir: PathBuf::new(),
        ..ManagerConfig::default()
    }
    .normalize()
    .expect("normalize config");

    assert_eq!(config.self_package, DEFAULT_SELF_PACKAGE);
    assert_eq!(config.helper_command, vec!["su", "-c"]);
    assert!(config.profiles_path.is_none());
    assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
}

#[test]
fn load_should_apply_file_values_and_data_dir_override() {
    let path = temp_file(
        "config.json",
        r#"{"selfPackage": "com.example.manager", "showSystemApps": true, "log": {"keepDays": 500}}"#,
    );

    let config = ManagerConfig::load_from(Some(&path), Some(PathBuf::from("/tmp/sumgr-data")))
        .expect("load config");

    assert_eq!(config.self_package, "com.example.manager");
    assert!(config.filters().show_system_apps);
    assert!(!config.filters().show_only_primary_user_apps);
    assert_eq!(config.data_dir, PathBuf::from("/tmp/sumgr-data"));
    assert_eq!(config.log.keep_days, 90);
}

#[test]
fn load_should_report_parse_errors_with_path() {
    let path = temp_file("broken.json", "{not json");
    let error = ManagerConfig::load_from(Some(&path), None).expect_err("parse fails");

    assert_eq!(error.code, "config_parse_failed");
    assert_eq!(
        error.context_value("configPath"),
        Some(path.display().to_string().as_str())
    );
}

#[test]
fn profile_store_should_load_export() {
    let path = temp_file(
        "profiles.json",
        r#"{"profiles": [{"name": "com.example.app", "currentUid": 10123, "allowSu": true}]}"#,
    );
    let store = load_profile_store(Some(&path)).expect("load profiles");
    assert_eq!(store.len(), 1);

    let empty = load_profile_store(None).expect("empty store");
    assert!(empty.is_empty());

    let missing = load_profile_store(Some(Path::new("/nonexistent/sumgr/profiles.json")))
        .expect_err("missing export");
    assert_eq!(missing.code, "profiles_missing");
}
