use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use sumgr_contracts::models::DirectoryFilters;
use sumgr_contracts::{AppError, AppResult, ResultExt};
use sumgr_directory::{MemoryProfileStore, ProfileExport};
use sumgr_logging::LogConfig;

pub const CONFIG_PATH_ENV: &str = "SUMGR_CONFIG";
pub const DATA_DIR_ENV: &str = "SUMGR_DATA_DIR";

const DEFAULT_SELF_PACKAGE: &str = "me.sumgr.manager";
const DEFAULT_DATA_DIR: &str = "/data/local/tmp/sumgr";
const MAX_HELPER_ARGS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    pub self_package: String,
    /// Empty means `su -c '<current exe> serve'`.
    pub helper_command: Vec<String>,
    pub profiles_path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub show_system_apps: bool,
    pub show_only_primary_user_apps: bool,
    pub package_flags: u32,
    pub log: LogConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            self_package: DEFAULT_SELF_PACKAGE.to_string(),
            helper_command: Vec::new(),
            profiles_path: None,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            show_system_apps: false,
            show_only_primary_user_apps: false,
            package_flags: 0,
            log: LogConfig::default(),
        }
    }
}

impl ManagerConfig {
    pub fn normalize(mut self) -> AppResult<Self> {
        self.self_package = self.self_package.trim().to_string();
        if self.self_package.is_empty() {
            self.self_package = DEFAULT_SELF_PACKAGE.to_string();
        }

        self.helper_command = self
            .helper_command
            .into_iter()
            .map(|arg| arg.trim().to_string())
            .filter(|arg| !arg.is_empty())
            .take(MAX_HELPER_ARGS)
            .collect();

        self.profiles_path = self
            .profiles_path
            .filter(|path| !path.as_os_str().is_empty());
        if self.data_dir.as_os_str().is_empty() {
            self.data_dir = PathBuf::from(DEFAULT_DATA_DIR);
        }

        self.log = self.log.normalize()?;
        Ok(self)
    }

    pub fn filters(&self) -> DirectoryFilters {
        DirectoryFilters {
            show_system_apps: self.show_system_apps,
            show_only_primary_user_apps: self.show_only_primary_user_apps,
        }
    }

    /// Reads `path`, or the file named by `SUMGR_CONFIG`, then applies the
    /// `SUMGR_DATA_DIR` override.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let env_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let path = path.map(Path::to_path_buf).or(env_path);
        let data_dir = std::env::var_os(DATA_DIR_ENV).map(PathBuf::from);
        Self::load_from(path.as_deref(), data_dir)
    }

    pub fn load_from(path: Option<&Path>, data_dir_override: Option<PathBuf>) -> AppResult<Self> {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_code("config_read_failed", "failed to read config file")
                    .with_ctx("configPath", path.display().to_string())?;
                serde_json::from_str::<Self>(&text)
                    .with_code("config_parse_failed", "failed to parse config file")
                    .with_ctx("configPath", path.display().to_string())?
            }
            None => Self::default(),
        };
        if let Some(data_dir) = data_dir_override {
            config.data_dir = data_dir;
        }
        config.normalize()
    }
}

/// Loads a profile export; a missing path yields an empty store.
pub fn load_profile_store(path: Option<&Path>) -> AppResult<MemoryProfileStore> {
    let Some(path) = path else {
        return Ok(MemoryProfileStore::new());
    };
    if !path.exists() {
        return Err(AppError::new("profiles_missing", "profile export not found")
            .with_context("profilesPath", path.display().to_string()));
    }

    let text = fs::read_to_string(path)
        .with_code("profiles_read_failed", "failed to read profile export")
        .with_ctx("profilesPath", path.display().to_string())?;
    let export = serde_json::from_str::<ProfileExport>(&text)
        .with_code("profiles_parse_failed", "failed to parse profile export")
        .with_ctx("profilesPath", path.display().to_string())?;
    Ok(MemoryProfileStore::from_export(export))
}

#[cfg(test)]
#[path = "../tests/config/config_tests.rs"]
mod config_tests;
