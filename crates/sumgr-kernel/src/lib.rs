pub mod runtime;

pub use sumgr_contracts::{AppError, AppResult, ResultExt};
