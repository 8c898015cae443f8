//! Newline-delimited JSON exchanged with the privileged helper over stdio.

use crate::channel::{ServiceCapabilities, TransportError, TransportResult, UserQueryStrategy};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum WireMethod {
    Hello,
    #[serde(rename_all = "camelCase")]
    ListUserIds { strategy: UserQueryStrategy },
    #[serde(rename_all = "camelCase")]
    ListPackages { flags: u32 },
    Shutdown,
}

impl WireMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::ListUserIds { .. } => "listUserIds",
            Self::ListPackages { .. } => "listPackages",
            Self::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRequest {
    pub id: u64,
    #[serde(flatten)]
    pub method: WireMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResponse {
    pub id: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WireResponse {
    pub fn success<T: Serialize>(id: u64, value: &T) -> TransportResult<Self> {
        let result = serde_json::to_value(value)
            .map_err(|error| TransportError::new(format!("encode result failed: {error}")))?;
        Ok(Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        })
    }

    pub fn failure(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(message.into()),
        }
    }

    pub fn into_result<T: DeserializeOwned>(self) -> TransportResult<T> {
        if !self.ok {
            let message = self
                .error
                .unwrap_or_else(|| "helper reported an error".to_string());
            return Err(TransportError::new(message));
        }
        let value = self.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(value)
            .map_err(|error| TransportError::new(format!("decode result failed: {error}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    pub protocol_version: u32,
    pub capabilities: ServiceCapabilities,
}

#[cfg(test)]
#[path = "../tests/service/wire_tests.rs"]
mod wire_tests;
