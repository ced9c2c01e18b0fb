//! HTTP plumbing shared by the Key Vault client and the credentials.
//!
//! The public API is synchronous. Each operation runs on its own
//! current-thread Tokio runtime.

use std::future::Future;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{RemoteError, Result};

/// Build an HTTP client for one operation.
pub(crate) fn client(operation: &'static str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("azkv/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            RemoteError::Client {
                operation,
                reason: e.to_string(),
            }
            .into()
        })
}

/// Run `fut` to completion on a fresh current-thread runtime.
///
/// Must not be called from within an async context.
pub(crate) fn block_on<T, F>(operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| RemoteError::Client {
            operation,
            reason: format!("failed to create runtime: {}", e),
        })?;
    rt.block_on(fut)
}

/// Error code and message extracted from a failed response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Parse an error body from Key Vault or the identity platform.
///
/// Key Vault nests `{"error": {"code", "message"}}`; the identity platform
/// and IMDS use `{"error": "...", "error_description": "..."}`. Anything
/// else is reported verbatim.
pub(crate) fn error_detail(body: &str) -> ErrorDetail {
    let value: Option<Value> = serde_json::from_str(body).ok();
    let error = value.as_ref().and_then(|v| v.get("error"));

    match error {
        Some(Value::Object(inner)) => ErrorDetail {
            code: string_field(inner.get("code")),
            message: string_field(inner.get("message")),
        },
        Some(Value::String(code)) => ErrorDetail {
            code: code.clone(),
            message: string_field(value.as_ref().and_then(|v| v.get("error_description"))),
        },
        _ => ErrorDetail {
            code: "unknown".to_string(),
            message: body.trim().chars().take(512).collect(),
        },
    }
}

fn string_field(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// A number that some endpoints send as a JSON string.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub(crate) enum NumberOrString {
    Number(i64),
    Text(String),
}

impl NumberOrString {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}
