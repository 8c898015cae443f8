use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use sumgr_contracts::AppResult;
use sumgr_contracts::models::PackageMeta;

/// How the service lists device users. Chosen once per manager from the
/// capabilities the service reports on its first bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserQueryStrategy {
    UsersExcludingDying,
    AliveUsers,
    PrimaryOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceCapabilities {
    pub users_excluding_dying: bool,
    pub alive_users: bool,
}

impl ServiceCapabilities {
    pub fn negotiate(self) -> UserQueryStrategy {
        if self.users_excluding_dying {
            UserQueryStrategy::UsersExcludingDying
        } else if self.alive_users {
            UserQueryStrategy::AliveUsers
        } else {
            UserQueryStrategy::PrimaryOnly
        }
    }
}

/// Transport-level failure of one remote call. Triggers the reconnect-once
/// policy in the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "transport error: {}", self.message)
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(value: std::io::Error) -> Self {
        Self::new(value.to_string())
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Invoked by a channel when it learns that the service went away on its own.
pub type DisconnectHook = Arc<dyn Fn(&str) + Send + Sync>;

/// A bound connection to the enumeration service. Methods block.
pub trait ServiceChannel: Send {
    fn capabilities(&mut self) -> TransportResult<ServiceCapabilities>;

    fn list_user_ids(&mut self, strategy: UserQueryStrategy) -> TransportResult<Vec<i32>>;

    /// Packages of every live user, `flags` forwarded to the package manager.
    fn list_packages(&mut self, flags: u32) -> TransportResult<Vec<PackageMeta>>;

    fn release(&mut self);
}

pub trait ServiceBinder: Send + Sync {
    /// Binds a new channel. Fails with `service_unavailable` when the
    /// privileged side cannot be reached.
    fn bind(&self, on_disconnect: DisconnectHook) -> AppResult<Box<dyn ServiceChannel>>;
}
