mod channel;
mod manager;
mod process;
pub mod wire;

pub use channel::{
    DisconnectHook, ServiceBinder, ServiceCapabilities, ServiceChannel, TransportError,
    TransportResult, UserQueryStrategy,
};
pub use manager::{ChannelLease, ConnectionStatsSnapshot, ServiceConnectionManager};
pub use process::{HELPER_SERVE_ARG, ProcessServiceBinder};

pub use sumgr_contracts::{AppError, AppResult, ResultExt};
