mod cli;
mod config;
mod helper;

pub use cli::{Cli, Commands};
pub use config::{CONFIG_PATH_ENV, DATA_DIR_ENV, ManagerConfig, load_profile_store};
pub use helper::{CommandRunner, PmBackend, SystemCommandRunner, serve};

use clap::Parser;
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use sumgr_contracts::models::{AppRecord, GroupedEntry, SearchView};
use sumgr_contracts::{AppError, AppResult, ErrorKind, ResultExt};
use sumgr_directory::{AppDirectory, DirectoryOptions, RefreshOutcome};
use sumgr_logging::{LoggingGuard, init_logging, shutdown_logging};
use sumgr_service::{ConnectionStatsSnapshot, ProcessServiceBinder, ServiceConnectionManager};

#[derive(Debug, Clone)]
pub struct ListOptions {
    pub show_system_apps: bool,
    pub show_only_primary_user_apps: bool,
    pub search: Option<String>,
    pub grouped: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListReport {
    pub outcome: RefreshOutcome,
    pub live_user_ids: Vec<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<AppRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<GroupedEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchView>,
    pub connection: ConnectionStatsSnapshot,
}

pub(crate) fn log_warn_fallback(message: &str) {
    if tracing::dispatcher::has_been_set() {
        tracing::warn!(event = "bootstrap_warning", message = message);
        return;
    }

    eprintln!("{message}");
}

fn start_logging(config: &ManagerConfig) -> Option<LoggingGuard> {
    match init_logging(&config.data_dir, &config.log) {
        Ok(guard) => Some(guard),
        Err(error) => {
            log_warn_fallback(&format!("logging disabled: {error}"));
            None
        }
    }
}

fn helper_binder(config: &ManagerConfig) -> AppResult<ProcessServiceBinder> {
    if !config.helper_command.is_empty() {
        return Ok(ProcessServiceBinder::new(config.helper_command.clone()));
    }
    let exe = std::env::current_exe()
        .with_code("current_exe_unavailable", "failed to resolve own executable")?;
    Ok(ProcessServiceBinder::elevated_helper(&exe))
}

/// Wires a fresh directory against the process helper and runs one full
/// refresh.
pub async fn list_apps(
    config: &ManagerConfig,
    profiles_path: Option<&Path>,
    options: ListOptions,
) -> AppResult<ListReport> {
    let store = load_profile_store(profiles_path.or(config.profiles_path.as_deref()))?;
    let manager = ServiceConnectionManager::new(Arc::new(helper_binder(config)?));
    let directory = AppDirectory::new(
        manager,
        Arc::new(store),
        DirectoryOptions {
            self_package: config.self_package.clone(),
            package_flags: config.package_flags,
            filters: config.filters(),
        },
    );
    directory.set_show_system_apps(options.show_system_apps || config.show_system_apps);
    directory.set_show_only_primary_user_apps(
        options.show_only_primary_user_apps || config.show_only_primary_user_apps,
    );
    if let Some(text) = options.search.as_deref() {
        directory.update_search_text(text);
    }

    let outcome = directory.fetch().await?;
    let snapshot = directory.snapshot();
    Ok(ListReport {
        outcome,
        live_user_ids: snapshot.live_user_ids.iter().copied().collect(),
        last_error: snapshot.last_error,
        records: (!options.grouped).then(|| snapshot.visible_records.clone()),
        groups: options.grouped.then(|| snapshot.groups.clone()),
        search: options.search.as_ref().map(|_| snapshot.search.clone()),
        connection: directory.service().stats(),
    })
}

fn run_list(config: ManagerConfig, profiles: Option<&Path>, options: ListOptions) -> AppResult<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .with_code("runtime_build_failed", "failed to start async runtime")?;
    let report = runtime.block_on(list_apps(&config, profiles, options))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_serve() -> AppResult<()> {
    let backend = PmBackend::system();
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve(&backend, stdin.lock(), stdout.lock())?;
    Ok(())
}

fn report_error(error: &AppError) {
    tracing::error!(
        event = "command_failed",
        code = error.code.as_str(),
        message = error.message.as_str()
    );
    match serde_json::to_string(error) {
        Ok(text) => eprintln!("{text}"),
        Err(_) => eprintln!("{error}"),
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config = match ManagerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            report_error(&error);
            return ExitCode::FAILURE;
        }
    };
    let _logging = start_logging(&config);

    let result = match cli.command {
        Commands::Serve => run_serve(),
        Commands::List {
            system,
            primary_only,
            search,
            grouped,
            profiles,
        } => run_list(
            config,
            profiles.as_deref(),
            ListOptions {
                show_system_apps: system,
                show_only_primary_user_apps: primary_only,
                search,
                grouped,
            },
        ),
    };

    let code = match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report_error(&error);
            ExitCode::FAILURE
        }
    };
    shutdown_logging();
    code
}
