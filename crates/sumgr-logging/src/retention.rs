use crate::{AppError, ResultExt};
use anyhow::Context;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

pub(crate) fn cleanup_expired_logs_with_duration(
    log_dir: &Path,
    keep_duration: Duration,
    now: SystemTime,
) -> Result<usize, AppError> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let entries = fs::read_dir(log_dir)
        .with_context(|| format!("failed to read log dir: {}", log_dir.display()))
        .with_code("log_cleanup_read_dir_failed", "failed to read log dir")
        .with_ctx("logDir", log_dir.display().to_string())?;

    let mut removed = 0usize;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_log_file = path
            .extension()
            .and_then(|value| value.to_str())
            .is_some_and(|value| value.eq_ignore_ascii_case("log"));
        if !is_log_file {
            continue;
        }

        let modified_at = entry
            .metadata()
            .and_then(|metadata| metadata.modified())
            .with_context(|| format!("failed to read log mtime: {}", path.display()))
            .with_code("log_cleanup_modified_time_failed", "failed to read log mtime")
            .with_ctx("logPath", path.display().to_string())?;

        let elapsed = now.duration_since(modified_at).unwrap_or_default();
        if elapsed <= keep_duration {
            continue;
        }

        fs::remove_file(&path)
            .with_context(|| format!("failed to remove expired log: {}", path.display()))
            .with_code("log_cleanup_remove_failed", "failed to remove expired log")
            .with_ctx("logPath", path.display().to_string())?;
        removed += 1;
    }

    Ok(removed)
}

pub fn cleanup_expired_logs(log_dir: &Path, keep_days: u64) -> Result<(), AppError> {
    let keep_duration = Duration::from_secs(keep_days.saturating_mul(SECONDS_PER_DAY));
    let _ = cleanup_expired_logs_with_duration(log_dir, keep_duration, SystemTime::now())?;
    Ok(())
}

#[cfg(test)]
#[path = "../tests/logging/retention_tests.rs"]
mod retention_tests;
