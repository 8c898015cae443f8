use crate::{AppError, ResultExt};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder as RollingBuilder, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[path = "config.rs"]
mod config;
#[path = "retention.rs"]
mod retention;

pub use config::{LogConfig, normalize_level};
pub use retention::cleanup_expired_logs;

const DEFAULT_KEEP_DAYS: u32 = 7;
const DEFAULT_MIN_LEVEL: &str = "info";
const MIN_KEEP_DAYS: u32 = 1;
const MAX_KEEP_DAYS: u32 = 90;
const LOG_LEVEL_ENV: &str = "SUMGR_LOG_LEVEL";
const LOG_FILE_PREFIX: &str = "sumgr";

#[derive(Debug, Clone)]
pub struct LoggingGuard {
    log_dir: PathBuf,
    level: String,
}

impl LoggingGuard {
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn level(&self) -> &str {
        &self.level
    }
}

fn worker_guard_slot() -> &'static Mutex<Option<WorkerGuard>> {
    static SLOT: OnceLock<Mutex<Option<WorkerGuard>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
}

pub fn resolve_log_level(config: &LogConfig) -> String {
    config::resolve_log_level(std::env::var(LOG_LEVEL_ENV).ok().as_deref(), config)
}

/// Installs the global subscriber: daily rolling JSON files under
/// `<data_dir>/logs`, plus a compact console layer in debug builds.
pub fn init_logging(data_dir: &Path, config: &LogConfig) -> Result<LoggingGuard, AppError> {
    let config = config.clone().normalize()?;
    let log_dir = data_dir.join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log dir: {}", log_dir.display()))
        .with_code("log_dir_create_failed", "failed to create log dir")
        .with_ctx("logDir", log_dir.display().to_string())?;
    cleanup_expired_logs(&log_dir, u64::from(config.keep_days))?;

    let file_appender = RollingBuilder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(&log_dir)
        .with_context(|| format!("failed to create log appender: {}", log_dir.display()))
        .with_code("log_appender_create_failed", "failed to create log appender")
        .with_ctx("logDir", log_dir.display().to_string())?;
    let (file_writer, worker_guard) = tracing_appender::non_blocking(file_appender);

    if let Ok(mut slot) = worker_guard_slot().lock() {
        *slot = Some(worker_guard);
    }

    let level = resolve_log_level(&config);
    if !tracing::dispatcher::has_been_set() {
        let env_filter = EnvFilter::new(level.clone());
        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(file_writer)
            .with_current_span(false)
            .with_span_list(false);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer);
        #[cfg(debug_assertions)]
        let subscriber = subscriber.with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(true)
                .with_target(true)
                .with_writer(std::io::stderr),
        );

        subscriber
            .try_init()
            .with_context(|| format!("failed to init log subscriber: level={level}"))
            .with_code("log_subscriber_init_failed", "failed to init log subscriber")
            .with_ctx("logLevel", level.clone())?;
    }

    tracing::info!(
        event = "logging_initialized",
        level = level.as_str(),
        keep_days = config.keep_days,
        log_dir = %log_dir.display()
    );
    Ok(LoggingGuard { log_dir, level })
}

/// Flushes buffered file output. Called once before process exit.
pub fn shutdown_logging() {
    if let Ok(mut slot) = worker_guard_slot().lock() {
        slot.take();
    }
}
