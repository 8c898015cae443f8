use crate::channel::{
    DisconnectHook, ServiceBinder, ServiceCapabilities, ServiceChannel, TransportResult,
    UserQueryStrategy,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use sumgr_contracts::models::PackageMeta;
use sumgr_contracts::{AppError, AppResult, ErrorKind, SERVICE_UNAVAILABLE_CODE};
use sumgr_kernel::runtime::run_blocking;

#[derive(Debug, Default)]
struct ConnectionStats {
    binds: AtomicU64,
    reconnects: AtomicU64,
    disconnects: AtomicU64,
    releases: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatsSnapshot {
    pub binds: u64,
    pub reconnects: u64,
    pub disconnects: u64,
    pub releases: u64,
}

impl ConnectionStats {
    fn snapshot(&self) -> ConnectionStatsSnapshot {
        ConnectionStatsSnapshot {
            binds: self.binds.load(Ordering::SeqCst),
            reconnects: self.reconnects.load(Ordering::SeqCst),
            disconnects: self.disconnects.load(Ordering::SeqCst),
            releases: self.releases.load(Ordering::SeqCst),
        }
    }
}

struct ManagerShared {
    binder: Arc<dyn ServiceBinder>,
    stats: Arc<ConnectionStats>,
    strategy: OnceLock<UserQueryStrategy>,
}

impl ManagerShared {
    fn disconnect_hook(&self) -> DisconnectHook {
        let stats = Arc::clone(&self.stats);
        Arc::new(move |reason: &str| {
            stats.disconnects.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(event = "service_disconnected", reason = reason);
        })
    }

    fn bind(&self) -> AppResult<Box<dyn ServiceChannel>> {
        let mut channel = self.binder.bind(self.disconnect_hook()).map_err(|error| {
            tracing::warn!(
                event = "service_bind_failed",
                code = error.code.as_str(),
                message = error.message.as_str()
            );
            if error.kind() == ErrorKind::ServiceUnavailable {
                error
            } else {
                error.with_code(SERVICE_UNAVAILABLE_CODE, "privileged service is unreachable")
            }
        })?;
        let binds = self.stats.binds.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(event = "service_bound", binds);

        if self.strategy.get().is_none() {
            match channel.capabilities() {
                Ok(capabilities) => {
                    self.adopt(capabilities);
                }
                Err(error) => {
                    // Left unset; the lease probes again under the reconnect policy.
                    tracing::warn!(event = "service_capabilities_probe_failed", error = %error);
                }
            }
        }

        Ok(channel)
    }

    fn adopt(&self, capabilities: ServiceCapabilities) -> UserQueryStrategy {
        let strategy = capabilities.negotiate();
        if self.strategy.set(strategy).is_ok() {
            tracing::info!(
                event = "service_capabilities_negotiated",
                strategy = ?strategy,
                users_excluding_dying = capabilities.users_excluding_dying,
                alive_users = capabilities.alive_users
            );
        }
        self.strategy.get().copied().unwrap_or(strategy)
    }

    fn release(&self, mut channel: Box<dyn ServiceChannel>) {
        channel.release();
        let releases = self.stats.releases.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(event = "service_channel_released", releases);
    }
}

/// One bound channel. Dropping the lease releases the channel.
pub struct ChannelLease {
    shared: Arc<ManagerShared>,
    channel: Option<Box<dyn ServiceChannel>>,
}

impl ChannelLease {
    /// The negotiated user strategy. Probes the service when the bind-time
    /// probe failed; a failing probe is a failed remote call.
    pub fn strategy(&mut self) -> AppResult<UserQueryStrategy> {
        if let Some(strategy) = self.shared.strategy.get() {
            return Ok(*strategy);
        }
        let capabilities = self.call("capabilities", |channel| channel.capabilities())?;
        Ok(self.shared.adopt(capabilities))
    }

    /// Live device user ids; the primary user when the service reports that
    /// it cannot list users at all.
    pub fn list_user_ids(&mut self) -> AppResult<BTreeSet<i32>> {
        let strategy = self.strategy()?;
        if strategy == UserQueryStrategy::PrimaryOnly {
            return Ok(BTreeSet::from([0]));
        }

        let ids = self.call("list_user_ids", |channel| channel.list_user_ids(strategy))?;
        let mut ids: BTreeSet<i32> = ids.into_iter().collect();
        if ids.is_empty() {
            ids.insert(0);
        }
        Ok(ids)
    }

    pub fn list_packages(&mut self, flags: u32) -> AppResult<Vec<PackageMeta>> {
        self.call("list_packages", |channel| channel.list_packages(flags))
    }

    fn channel_mut(&mut self) -> AppResult<&mut Box<dyn ServiceChannel>> {
        if self.channel.is_none() {
            self.channel = Some(self.shared.bind()?);
        }
        self.channel
            .as_mut()
            .ok_or_else(|| AppError::service_unavailable("service channel is not bound"))
    }

    fn reconnect(&mut self, operation: &'static str) -> AppResult<()> {
        if let Some(stale) = self.channel.take() {
            self.shared.release(stale);
        }
        let reconnects = self.shared.stats.reconnects.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(event = "service_reconnecting", operation, reconnects);
        self.channel = Some(
            self.shared
                .bind()
                .map_err(|error| error.with_context("operation", operation))?,
        );
        Ok(())
    }

    fn call<T, F>(&mut self, operation: &'static str, mut remote: F) -> AppResult<T>
    where
        F: FnMut(&mut dyn ServiceChannel) -> TransportResult<T>,
    {
        let first_error = match remote(self.channel_mut()?.as_mut()) {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        tracing::warn!(
            event = "service_call_failed",
            operation,
            attempt = 1,
            error = %first_error
        );

        self.reconnect(operation)?;
        remote(self.channel_mut()?.as_mut()).map_err(|error| {
            tracing::warn!(
                event = "service_call_failed",
                operation,
                attempt = 2,
                error = %error
            );
            AppError::remote_call_failed("remote call failed after reconnect")
                .with_context("operation", operation)
                .with_cause(first_error.to_string())
                .with_source(error)
        })
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            self.shared.release(channel);
        }
    }
}

/// Hands out service channels and owns the reconnect policy. Cloning shares
/// the binder, statistics and negotiated user strategy.
#[derive(Clone)]
pub struct ServiceConnectionManager {
    shared: Arc<ManagerShared>,
}

impl ServiceConnectionManager {
    pub fn new(binder: Arc<dyn ServiceBinder>) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                binder,
                stats: Arc::new(ConnectionStats::default()),
                strategy: OnceLock::new(),
            }),
        }
    }

    pub fn acquire_blocking(&self) -> AppResult<ChannelLease> {
        let channel = self.shared.bind()?;
        Ok(ChannelLease {
            shared: Arc::clone(&self.shared),
            channel: Some(channel),
        })
    }

    /// Binds on the blocking pool. Prefer [`Self::with_channel`], which also
    /// runs the remote calls there.
    pub async fn acquire(&self) -> AppResult<ChannelLease> {
        let manager = self.clone();
        run_blocking("service_acquire", move || manager.acquire_blocking()).await
    }

    /// Runs `body` with a fresh lease on the blocking pool. The lease lives
    /// inside the job, so the channel is released on every exit path even if
    /// the awaiting caller goes away.
    pub async fn with_channel<T, F>(&self, label: &'static str, body: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut ChannelLease) -> AppResult<T> + Send + 'static,
    {
        let manager = self.clone();
        run_blocking(label, move || {
            let mut lease = manager.acquire_blocking()?;
            body(&mut lease)
        })
        .await
    }

    pub fn strategy(&self) -> Option<UserQueryStrategy> {
        self.shared.strategy.get().copied()
    }

    pub fn stats(&self) -> ConnectionStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

#[cfg(test)]
#[path = "../tests/service/manager_tests.rs"]
mod manager_tests;
