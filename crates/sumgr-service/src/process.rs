use crate::channel::{
    DisconnectHook, ServiceBinder, ServiceCapabilities, ServiceChannel, TransportError,
    TransportResult, UserQueryStrategy,
};
use crate::wire::{HelloPayload, PROTOCOL_VERSION, WireMethod, WireRequest, WireResponse};
use anyhow::Context;
use serde::de::DeserializeOwned;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use sumgr_contracts::models::PackageMeta;
use sumgr_contracts::{AppError, AppResult, ResultExt, SERVICE_UNAVAILABLE_CODE};

/// Argument that switches the binary into helper mode.
pub const HELPER_SERVE_ARG: &str = "serve";

/// Binds by spawning the privileged helper and talking JSON lines over its
/// stdio.
#[derive(Debug, Clone)]
pub struct ProcessServiceBinder {
    command: Vec<String>,
}

impl ProcessServiceBinder {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// `su -c '<exe> serve'`, the path quoted for the shell `su` starts.
    pub fn elevated_helper(exe: &Path) -> Self {
        let exe = exe.display().to_string();
        Self::new(vec![
            "su".to_string(),
            "-c".to_string(),
            format!("{} {HELPER_SERVE_ARG}", shell_quote(&exe)),
        ])
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }
}

fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "/._-+:@%,=".contains(ch));
    if plain {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

impl ServiceBinder for ProcessServiceBinder {
    fn bind(&self, on_disconnect: DisconnectHook) -> AppResult<Box<dyn ServiceChannel>> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(AppError::service_unavailable("helper command is empty"));
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn helper: {program}"))
            .with_code(SERVICE_UNAVAILABLE_CODE, "failed to start privileged helper")
            .with_ctx("command", self.command.join(" "))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AppError::service_unavailable("helper stdio is not piped"));
        };

        let mut channel = ProcessChannel {
            child,
            writer: stdin,
            reader: BufReader::new(stdout),
            next_id: 1,
            capabilities: None,
            on_disconnect,
            disconnected: false,
            released: false,
        };

        let hello: HelloPayload = channel.request(WireMethod::Hello).map_err(|error| {
            AppError::service_unavailable("privileged helper handshake failed")
                .with_context("command", self.command.join(" "))
                .with_source(error)
        })?;
        if hello.protocol_version != PROTOCOL_VERSION {
            return Err(
                AppError::service_unavailable("privileged helper speaks another protocol")
                    .with_context("expected", PROTOCOL_VERSION.to_string())
                    .with_context("actual", hello.protocol_version.to_string()),
            );
        }
        channel.capabilities = Some(hello.capabilities);
        tracing::debug!(
            event = "helper_process_bound",
            pid = channel.child.id(),
            users_excluding_dying = hello.capabilities.users_excluding_dying,
            alive_users = hello.capabilities.alive_users
        );

        Ok(Box::new(channel))
    }
}

struct ProcessChannel {
    child: Child,
    writer: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    capabilities: Option<ServiceCapabilities>,
    on_disconnect: DisconnectHook,
    disconnected: bool,
    released: bool,
}

impl ProcessChannel {
    fn notify_disconnect(&mut self, reason: &str) {
        if !self.disconnected {
            self.disconnected = true;
            (self.on_disconnect)(reason);
        }
    }

    fn send(&mut self, request: &WireRequest) -> TransportResult<()> {
        let mut line = serde_json::to_string(request)
            .map_err(|error| TransportError::new(format!("encode request failed: {error}")))?;
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    fn request<T: DeserializeOwned>(&mut self, method: WireMethod) -> TransportResult<T> {
        if self.disconnected {
            return Err(TransportError::new("helper already disconnected"));
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.notify_disconnect(&format!("helper exited: {status}"));
            return Err(TransportError::new(format!("helper exited: {status}")));
        }

        let id = self.next_id;
        self.next_id += 1;
        let method_name = method.name();
        if let Err(error) = self.send(&WireRequest { id, method }) {
            self.notify_disconnect("helper stdin closed");
            return Err(error);
        }

        let mut line = String::new();
        let read = self.reader.read_line(&mut line)?;
        if read == 0 {
            self.notify_disconnect("helper stdout closed");
            return Err(TransportError::new(format!(
                "helper closed the stream during {method_name}"
            )));
        }

        let response: WireResponse = serde_json::from_str(line.trim_end())
            .map_err(|error| TransportError::new(format!("decode response failed: {error}")))?;
        if response.id != id {
            return Err(TransportError::new(format!(
                "response id mismatch: expected {id}, got {}",
                response.id
            )));
        }
        response.into_result()
    }

    fn shutdown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if !self.disconnected {
            let id = self.next_id;
            let _ = self.send(&WireRequest {
                id,
                method: WireMethod::Shutdown,
            });
        }
        if let Err(error) = self.child.kill() {
            tracing::debug!(event = "helper_process_kill_skipped", error = %error);
        }
        match self.child.wait() {
            Ok(status) => {
                tracing::debug!(event = "helper_process_reaped", status = %status);
            }
            Err(error) => {
                tracing::warn!(event = "helper_process_reap_failed", error = %error);
            }
        }
    }
}

impl ServiceChannel for ProcessChannel {
    fn capabilities(&mut self) -> TransportResult<ServiceCapabilities> {
        if let Some(capabilities) = self.capabilities {
            return Ok(capabilities);
        }
        let hello: HelloPayload = self.request(WireMethod::Hello)?;
        self.capabilities = Some(hello.capabilities);
        Ok(hello.capabilities)
    }

    fn list_user_ids(&mut self, strategy: UserQueryStrategy) -> TransportResult<Vec<i32>> {
        self.request(WireMethod::ListUserIds { strategy })
    }

    fn list_packages(&mut self, flags: u32) -> TransportResult<Vec<PackageMeta>> {
        self.request(WireMethod::ListPackages { flags })
    }

    fn release(&mut self) {
        self.shutdown();
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(all(test, unix))]
#[path = "../tests/service/process_tests.rs"]
mod process_tests;
