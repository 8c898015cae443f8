pub mod logging;

pub use logging::*;

pub use sumgr_contracts::{AppError, AppResult, ResultExt};
