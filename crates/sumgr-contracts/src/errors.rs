use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::ops::Deref;

const DEFAULT_CODE: &str = "internal_error";
const DEFAULT_MESSAGE: &str = "operation failed";
const RELEASE_REDACTED_CAUSE: &str = "error details hidden, see logs";

pub const SERVICE_UNAVAILABLE_CODE: &str = "service_unavailable";
pub const REMOTE_CALL_FAILED_CODE: &str = "remote_call_failed";
pub const PROFILE_LOOKUP_FAILED_CODE: &str = "profile_lookup_failed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContextItem {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<ErrorContextItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct AppError(Box<AppErrorPayload>);

/// Failure classes surfaced to the presentation layer through
/// `DirectorySnapshot::last_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    ServiceUnavailable,
    RemoteCallFailed,
    ProfileLookupFailed,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServiceUnavailable => SERVICE_UNAVAILABLE_CODE,
            Self::RemoteCallFailed => REMOTE_CALL_FAILED_CODE,
            Self::ProfileLookupFailed => PROFILE_LOOKUP_FAILED_CODE,
            Self::Internal => DEFAULT_CODE,
        }
    }

    pub fn from_error(error: &AppError) -> Self {
        match error.code.as_str() {
            SERVICE_UNAVAILABLE_CODE => Self::ServiceUnavailable,
            REMOTE_CALL_FAILED_CODE => Self::RemoteCallFailed,
            PROFILE_LOOKUP_FAILED_CODE => Self::ProfileLookupFailed,
            _ => Self::Internal,
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self(Box::new(AppErrorPayload {
            code: code.into(),
            message: message.into(),
            context: Vec::new(),
            causes: Vec::new(),
        }))
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(SERVICE_UNAVAILABLE_CODE, message)
    }

    pub fn remote_call_failed(message: impl Into<String>) -> Self {
        Self::new(REMOTE_CALL_FAILED_CODE, message)
    }

    pub fn profile_lookup_failed(message: impl Into<String>) -> Self {
        Self::new(PROFILE_LOOKUP_FAILED_CODE, message)
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_error(self)
    }

    pub fn with_code(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.0.code = code.into();
        self.0.message = message.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.context.push(ErrorContextItem {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.0
            .context
            .iter()
            .find(|item| item.key == key)
            .map(|item| item.value.as_str())
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        let cause = cause.into();
        if !cause.trim().is_empty() {
            self.0.causes.push(cause);
        }
        self
    }

    pub fn with_source<E>(mut self, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.put_context_if_absent("sourceType", std::any::type_name::<E>().to_string());
        let chain = collect_std_error_chain(&error);
        if !chain.is_empty() {
            self.put_context_if_absent("sourceChainDepth", chain.len().to_string());
        }
        self.with_causes(chain)
    }

    pub fn with_causes<I, S>(mut self, causes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for cause in causes {
            self = self.with_cause(cause);
        }
        self
    }

    pub fn from_anyhow(error: anyhow::Error) -> Self {
        if let Some(app_error) = error.downcast_ref::<Self>() {
            return app_error.clone();
        }

        let causes = visible_causes_for_mode(collect_error_chain(&error));
        Self(Box::new(AppErrorPayload {
            code: DEFAULT_CODE.to_string(),
            message: DEFAULT_MESSAGE.to_string(),
            context: Vec::new(),
            causes,
        }))
    }

    fn put_context_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if self.0.context.iter().any(|item| item.key == key) {
            return;
        }
        self.0.context.push(ErrorContextItem {
            key,
            value: value.into(),
        });
    }
}

impl Deref for AppError {
    type Target = AppErrorPayload;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

fn collect_error_chain(error: &anyhow::Error) -> Vec<String> {
    let mut causes = Vec::new();
    for cause in error.chain() {
        let text = cause.to_string();
        if text.trim().is_empty() {
            continue;
        }

        if causes.last().is_some_and(|last| last == &text) {
            continue;
        }
        causes.push(text);
    }
    causes
}

fn collect_std_error_chain(error: &(dyn StdError + 'static)) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(cause) = current {
        let text = cause.to_string();
        if !text.trim().is_empty() && causes.last().is_none_or(|last| last != &text) {
            causes.push(text);
        }
        current = cause.source();
    }
    causes
}

fn visible_causes_for_mode(causes: Vec<String>) -> Vec<String> {
    if cfg!(debug_assertions) {
        return causes;
    }

    match causes.into_iter().next() {
        Some(first) => vec![sanitize_cause_for_release(&first)],
        None => Vec::new(),
    }
}

fn sanitize_cause_for_release(cause: &str) -> String {
    let normalized = cause.replace('\n', " ").trim().to_string();
    if normalized.is_empty() || normalized.len() > 220 {
        return RELEASE_REDACTED_CAUSE.to_string();
    }

    // Package paths under /data/app carry randomized install tokens.
    if normalized.contains("/data/") {
        return RELEASE_REDACTED_CAUSE.to_string();
    }

    normalized
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl StdError for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::from_anyhow(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::new("io_error", "I/O operation failed").with_source(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::new("json_error", "JSON encoding failed").with_source(value)
    }
}

pub trait ResultExt<T> {
    fn with_code(self, code: impl Into<String>, message: impl Into<String>) -> AppResult<T>;
    fn with_ctx(self, key: impl Into<String>, value: impl Into<String>) -> AppResult<T>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn with_code(self, code: impl Into<String>, message: impl Into<String>) -> AppResult<T> {
        let code = code.into();
        let message = message.into();
        self.map_err(|error| AppError::from_anyhow(error.into()).with_code(code, message))
    }

    fn with_ctx(self, key: impl Into<String>, value: impl Into<String>) -> AppResult<T> {
        let key = key.into();
        let value = value.into();
        self.map_err(|error| AppError::from_anyhow(error.into()).with_context(key, value))
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[path = "../tests/errors/errors_tests.rs"]
mod errors_tests;
