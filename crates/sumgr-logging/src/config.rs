use super::{DEFAULT_KEEP_DAYS, DEFAULT_MIN_LEVEL, MAX_KEEP_DAYS, MIN_KEEP_DAYS};
use crate::AppError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogConfig {
    pub min_level: String,
    pub keep_days: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            min_level: DEFAULT_MIN_LEVEL.to_string(),
            keep_days: DEFAULT_KEEP_DAYS,
        }
    }
}

impl LogConfig {
    pub fn normalize(mut self) -> Result<Self, AppError> {
        let level = normalize_level(&self.min_level).ok_or_else(|| {
            AppError::new("invalid_log_level", "invalid log level")
                .with_context("level", self.min_level.clone())
        })?;
        self.min_level = level.to_string();
        self.keep_days = self.keep_days.clamp(MIN_KEEP_DAYS, MAX_KEEP_DAYS);
        Ok(self)
    }
}

pub fn normalize_level(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

pub(super) fn resolve_log_level(env_level: Option<&str>, config: &LogConfig) -> String {
    if let Some(level) = env_level.and_then(normalize_level) {
        return level.to_string();
    }

    if cfg!(debug_assertions) {
        return "debug".to_string();
    }

    normalize_level(&config.min_level)
        .unwrap_or(DEFAULT_MIN_LEVEL)
        .to_string()
}

#[cfg(test)]
#[path = "../tests/logging/config_tests.rs"]
mod config_tests;
