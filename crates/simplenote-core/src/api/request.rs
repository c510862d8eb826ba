//! Transport-neutral request and response values.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{ApiError, ApiResult};

/// Longest slice of a raw error body quoted in an error message.
const ERROR_BODY_MAX_CHARS: usize = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// One HTTP call against the API.
///
/// `path` is relative to the configured API root unless it is already an
/// absolute URL (pagination links).
#[derive(Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    #[must_use]
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("has_body", &self.body.is_some())
            .field("bearer", &self.bearer.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// The server rejected the bearer credential.
    pub const fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        serde_json::from_slice(&self.body).map_err(|error| ApiError::decoding(error.to_string()))
    }

    /// Human-readable summary of a failed response.
    pub fn error_message(&self) -> String {
        parse_api_error(self.status, &String::from_utf8_lossy(&self.body))
    }

    /// Body of a successful response, or a `Network` error describing it.
    pub fn into_success_body(self) -> ApiResult<Vec<u8>> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(ApiError::network(self.error_message()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    detail: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

fn parse_api_error(status: u16, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.detail.or(payload.message).or(payload.error) {
            return format!("{} ({status})", message.trim());
        }
    }

    let trimmed = body
        .trim()
        .chars()
        .take(ERROR_BODY_MAX_CHARS)
        .collect::<String>();
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("{trimmed} ({status})")
    }
}
