//! Privileged side of the enumeration service: answers wire requests on
//! stdio by querying the Android package manager.

use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::io::{BufRead, Write};
use std::process::Command;
use std::sync::OnceLock;
use sumgr_contracts::models::{PER_USER_RANGE, PackageFlags, PackageMeta};
use sumgr_contracts::{AppError, AppResult, ResultExt};
use sumgr_service::wire::{HelloPayload, PROTOCOL_VERSION, WireMethod, WireRequest, WireResponse};
use sumgr_service::{ServiceCapabilities, UserQueryStrategy};

const SYSTEM_PATH_PREFIXES: [&str; 6] = [
    "/system/", "/system_ext/", "/product/", "/vendor/", "/odm/", "/apex/",
];
/// `PackageManager.MATCH_UNINSTALLED_PACKAGES`
const MATCH_UNINSTALLED_PACKAGES: u32 = 0x0000_2000;

pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> AppResult<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> AppResult<String> {
        let output = Command::new(program)
            .args(args)
            .output()
            .with_code("helper_command_spawn_failed", "failed to run system command")
            .with_ctx("command", format!("{program} {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(
                AppError::new("helper_command_failed", "system command exited with failure")
                    .with_context("command", format!("{program} {}", args.join(" ")))
                    .with_context("status", output.status.to_string())
                    .with_cause(String::from_utf8_lossy(&output.stderr).trim().to_string()),
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UserLine {
    pub id: i32,
    pub running: bool,
}

fn user_line_regex() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new(r"UserInfo\{(\d+):[^}]*\}(\s+running)?").ok())
        .as_ref()
}

fn package_line_regex() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX
        .get_or_init(|| {
            Regex::new(r"^package:(?P<path>.+)=(?P<name>[A-Za-z0-9_.]+)\s+uid:(?P<uid>\d+)").ok()
        })
        .as_ref()
}

fn overlay_line_regex() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new(r"^\s*\[.\]\s+(\S+)").ok())
        .as_ref()
}

/// Parses `pm list users`.
pub(crate) fn parse_users(output: &str) -> Vec<UserLine> {
    let Some(regex) = user_line_regex() else {
        return Vec::new();
    };
    regex
        .captures_iter(output)
        .filter_map(|captures| {
            let id = captures.get(1)?.as_str().parse::<i32>().ok()?;
            Some(UserLine {
                id,
                running: captures.get(2).is_some(),
            })
        })
        .collect()
}

/// Parses `pm list packages -U -f` for one user. The uid is rebased onto
/// `user_id` whether pm printed an app id or a full uid. pm prints no
/// application labels, so `label` stays unset and records display the
/// package name.
pub(crate) fn parse_packages(output: &str, user_id: i32) -> Vec<PackageMeta> {
    let Some(regex) = package_line_regex() else {
        return Vec::new();
    };
    output
        .lines()
        .filter_map(|line| {
            let captures = regex.captures(line.trim())?;
            let path = captures.name("path")?.as_str();
            let name = captures.name("name")?.as_str();
            let raw_uid = captures.name("uid")?.as_str().parse::<i32>().ok()?;

            let mut meta = PackageMeta::new(name, user_id * PER_USER_RANGE + raw_uid % PER_USER_RANGE);
            meta.source_dir = Some(path.to_string());
            if SYSTEM_PATH_PREFIXES
                .iter()
                .any(|prefix| path.starts_with(prefix))
            {
                meta.flags.insert(PackageFlags::SYSTEM);
            }
            Some(meta)
        })
        .collect()
}

/// Parses `cmd overlay list`: target lines are unbracketed, overlays are
/// `[x] name` or `[ ] name`.
pub(crate) fn parse_overlays(output: &str) -> BTreeSet<String> {
    let Some(regex) = overlay_line_regex() else {
        return BTreeSet::new();
    };
    output
        .lines()
        .filter_map(|line| regex.captures(line))
        .filter_map(|captures| captures.get(1).map(|value| value.as_str().to_string()))
        .collect()
}

fn mark_shared_uids(packages: &mut [PackageMeta]) {
    let mut counts = HashMap::<i32, usize>::new();
    for package in packages.iter() {
        *counts.entry(package.uid).or_default() += 1;
    }
    for package in packages.iter_mut() {
        if counts.get(&package.uid).copied().unwrap_or(0) > 1 {
            package.flags.insert(PackageFlags::SHARED_UID);
        }
    }
}

/// Package listing backend of the helper.
pub struct PmBackend {
    runner: Box<dyn CommandRunner>,
    capabilities: OnceLock<ServiceCapabilities>,
}

impl PmBackend {
    pub fn new(runner: Box<dyn CommandRunner>) -> Self {
        Self {
            runner,
            capabilities: OnceLock::new(),
        }
    }

    pub fn system() -> Self {
        Self::new(Box::new(SystemCommandRunner))
    }

    fn pm(&self, args: &[&str]) -> AppResult<String> {
        let args = args.iter().map(ToString::to_string).collect::<Vec<_>>();
        self.runner.run("pm", &args)
    }

    /// `pm list users` hides dying users itself; running state is what
    /// separates alive users.
    pub fn capabilities(&self) -> ServiceCapabilities {
        *self.capabilities.get_or_init(|| match self.pm(&["list", "users"]) {
            Ok(output) if !parse_users(&output).is_empty() => ServiceCapabilities {
                users_excluding_dying: true,
                alive_users: true,
            },
            Ok(_) => ServiceCapabilities::default(),
            Err(error) => {
                tracing::warn!(
                    event = "helper_user_listing_unavailable",
                    code = error.code.as_str(),
                    message = error.message.as_str()
                );
                ServiceCapabilities::default()
            }
        })
    }

    pub fn list_user_ids(&self, strategy: UserQueryStrategy) -> AppResult<Vec<i32>> {
        if strategy == UserQueryStrategy::PrimaryOnly {
            return Ok(vec![0]);
        }
        let users = parse_users(&self.pm(&["list", "users"])?);
        let mut ids = users
            .into_iter()
            .filter(|user| strategy != UserQueryStrategy::AliveUsers || user.running)
            .map(|user| user.id)
            .collect::<BTreeSet<_>>();
        if ids.is_empty() {
            ids.insert(0);
        }
        Ok(ids.into_iter().collect())
    }

    fn overlays_for(&self, user_id: i32) -> BTreeSet<String> {
        let args = ["overlay", "list", "--user"]
            .iter()
            .map(ToString::to_string)
            .chain(std::iter::once(user_id.to_string()))
            .collect::<Vec<_>>();
        match self.runner.run("cmd", &args) {
            Ok(output) => parse_overlays(&output),
            Err(error) => {
                tracing::warn!(
                    event = "helper_overlay_listing_failed",
                    user = user_id,
                    code = error.code.as_str()
                );
                BTreeSet::new()
            }
        }
    }

    pub fn list_packages(&self, flags: u32) -> AppResult<Vec<PackageMeta>> {
        let strategy = self.capabilities().negotiate();
        let users = self.list_user_ids(strategy)?;

        let mut packages = Vec::new();
        for user_id in users {
            let user_arg = user_id.to_string();
            let mut args = vec!["list", "packages", "-U", "-f", "--user", user_arg.as_str()];
            if flags & MATCH_UNINSTALLED_PACKAGES != 0 {
                args.push("-u");
            }
            let output = self.pm(&args)?;
            let overlays = self.overlays_for(user_id);
            let mut user_packages = parse_packages(&output, user_id);
            for package in user_packages.iter_mut() {
                if overlays.contains(&package.package_name) {
                    package.flags.insert(PackageFlags::RESOURCE_OVERLAY);
                }
            }
            tracing::debug!(
                event = "helper_user_packages_listed",
                user = user_id,
                packages = user_packages.len(),
                overlays = overlays.len()
            );
            packages.extend(user_packages);
        }
        mark_shared_uids(&mut packages);
        Ok(packages)
    }
}

fn respond<T: serde::Serialize>(id: u64, result: AppResult<T>) -> WireResponse {
    match result {
        Ok(value) => WireResponse::success(id, &value)
            .unwrap_or_else(|error| WireResponse::failure(id, error.message())),
        Err(error) => WireResponse::failure(id, format!("{}: {}", error.code, error.message)),
    }
}

fn write_response<W: Write>(output: &mut W, response: &WireResponse) -> AppResult<()> {
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    output
        .write_all(line.as_bytes())
        .with_code("helper_write_failed", "failed to write helper response")?;
    output
        .flush()
        .with_code("helper_write_failed", "failed to flush helper response")?;
    Ok(())
}

/// Answers requests until `shutdown` or end of input. Returns the number of
/// requests handled.
pub fn serve<R: BufRead, W: Write>(backend: &PmBackend, input: R, mut output: W) -> AppResult<usize> {
    let mut handled = 0usize;
    for line in input.lines() {
        let line = line.with_code("helper_read_failed", "failed to read helper request")?;
        if line.trim().is_empty() {
            continue;
        }
        handled += 1;

        let request = match serde_json::from_str::<WireRequest>(&line) {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!(event = "helper_request_invalid", error = %error);
                write_response(&mut output, &WireResponse::failure(0, format!("invalid request: {error}")))?;
                continue;
            }
        };

        let method = request.method.name();
        tracing::debug!(event = "helper_request", id = request.id, method);
        let response = match request.method {
            WireMethod::Hello => respond(
                request.id,
                Ok(HelloPayload {
                    protocol_version: PROTOCOL_VERSION,
                    capabilities: backend.capabilities(),
                }),
            ),
            WireMethod::ListUserIds { strategy } => {
                respond(request.id, backend.list_user_ids(strategy))
            }
            WireMethod::ListPackages { flags } => respond(request.id, backend.list_packages(flags)),
            WireMethod::Shutdown => {
                write_response(&mut output, &respond(request.id, Ok(())))?;
                tracing::info!(event = "helper_shutdown", handled);
                return Ok(handled);
            }
        };
        write_response(&mut output, &response)?;
    }
    tracing::info!(event = "helper_input_closed", handled);
    Ok(handled)
}

#[cfg(test)]
#[path = "../tests/helper/helper_tests.rs"]
mod helper_tests;
