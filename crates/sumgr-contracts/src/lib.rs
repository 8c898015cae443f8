mod errors;
pub mod models;

pub use errors::{
    AppError, AppErrorPayload, AppResult, ErrorContextItem, ErrorKind, PROFILE_LOOKUP_FAILED_CODE,
    REMOTE_CALL_FAILED_CODE, ResultExt, SERVICE_UNAVAILABLE_CODE,
};

#[cfg(test)]
#[path = "../tests/models/models_tests.rs"]
mod models_tests;
