use super::*;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_nanos())
        .unwrap_or(0);
    let path = std::env::temp_dir().join(format!("sumgr-{prefix}-{}-{now}", std::process::id()));
    fs::create_dir_all(&path).expect("create temp dir");
    path
}

#[test]
fn cleanup_should_remove_only_expired_log_files() {
    let dir = unique_temp_dir("log-retention");
    let log_file = dir.join("sumgr.2026-01-01.log");
    let other_file = dir.join("notes.txt");
    fs::write(&log_file, "{}").expect("write log file");
    fs::write(&other_file, "keep").expect("write other file");

    let later = SystemTime::now() + Duration::from_secs(3 * SECONDS_PER_DAY);
    let removed =
        cleanup_expired_logs_with_duration(&dir, Duration::from_secs(SECONDS_PER_DAY), later)
            .expect("cleanup logs");

    assert_eq!(removed, 1);
    assert!(!log_file.exists());
    assert!(other_file.exists());
    fs::remove_dir_all(&dir).expect("cleanup temp dir");
}

#[test]
fn cleanup_should_keep_fresh_logs() {
    let dir = unique_temp_dir("log-retention-fresh");
    let log_file = dir.join("sumgr.log");
    fs::write(&log_file, "{}").expect("write log file");

    cleanup_expired_logs(&dir, 7).expect("cleanup logs");
    assert!(log_file.exists());
    fs::remove_dir_all(&dir).expect("cleanup temp dir");
}

#[test]
fn cleanup_should_ignore_missing_dir() {
    let missing = std::env::temp_dir().join("sumgr-log-retention-missing-dir");
    let removed = cleanup_expired_logs_with_duration(&missing, Duration::ZERO, SystemTime::now())
        .expect("missing dir is fine");
    assert_eq!(removed, 0);
}
