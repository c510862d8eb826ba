//! Client configuration.
//!
//! `ClientConfig` carries the API endpoint and HTTP timeout shared by every
//! front end. Values are validated once, when the config is built.

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{is_http_url, normalize_text_option};

/// API root used when nothing else is configured.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Refusing to send credentials outside the API origin: {0}")]
    ForeignOrigin(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Build a config for the given API root, using default timeouts.
    pub fn new(api_base_url: impl Into<String>) -> Result<Self, ConfigError> {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
        .validated()
    }

    /// Normalize the base URL and reject unusable values.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.api_base_url = normalize_base_url(&self.api_base_url)?;
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }

    #[must_use]
    pub const fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Absolute URL for an API path.
    ///
    /// Absolute inputs, such as pagination links, are returned unchanged when
    /// they share the base URL's scheme, host and port.
    pub fn endpoint(&self, path: &str) -> Result<String, ConfigError> {
        if !is_http_url(path) {
            return Ok(format!(
                "{}{}",
                self.api_base_url,
                path.trim_start_matches('/')
            ));
        }
        match (Url::parse(path), Url::parse(&self.api_base_url)) {
            (Ok(target), Ok(base)) if target.origin() == base.origin() => Ok(path.to_string()),
            _ => Err(ConfigError::ForeignOrigin(path.to_string())),
        }
    }
}

/// Trim the URL, require an http(s) scheme and ensure a trailing slash so
/// relative paths join cleanly.
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let url = normalize_text_option(Some(raw.to_string()))
        .ok_or_else(|| ConfigError::Invalid("API base URL must not be empty".to_string()))?;
    if !is_http_url(&url) {
        return Err(ConfigError::Invalid(
            "API base URL must include http:// or https://".to_string(),
        ));
    }
    Ok(format!("{}/", url.trim_end_matches('/')))
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_appends_trailing_slash() {
        assert_eq!(
            normalize_base_url(" https://notes.example.com/api ").unwrap(),
            "https://notes.example.com/api/"
        );
        assert_eq!(
            normalize_base_url("http://localhost:8000/api//").unwrap(),
            "http://localhost:8000/api/"
        );
    }

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url("").is_err());
        assert!(normalize_base_url("notes.example.com/api").is_err());
    }

    #[test]
    fn endpoint_joins_relative_paths() {
        let config = ClientConfig::new("https://notes.example.com/api").unwrap();
        assert_eq!(
            config.endpoint("notes/42/").unwrap(),
            "https://notes.example.com/api/notes/42/"
        );
        assert_eq!(
            config.endpoint("/auth/token/").unwrap(),
            "https://notes.example.com/api/auth/token/"
        );
    }

    #[test]
    fn endpoint_keeps_absolute_urls_on_same_origin() {
        let config = ClientConfig::default();
        assert_eq!(
            config
                .endpoint("http://localhost:8000/api/notes/?page=2")
                .unwrap(),
            "http://localhost:8000/api/notes/?page=2"
        );
    }

    #[test]
    fn endpoint_rejects_other_origins() {
        let config = ClientConfig::new("https://notes.example.com/api").unwrap();
        for foreign in [
            "https://evil.example.com/api/notes/?page=2",
            "http://notes.example.com/api/notes/?page=2",
            "https://notes.example.com:8443/api/notes/",
            "https://notes.example.com@evil.example.com/api/notes/",
        ] {
            assert_eq!(
                config.endpoint(foreign),
                Err(ConfigError::ForeignOrigin(foreign.to_string()))
            );
        }
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let error = ClientConfig::default()
            .with_request_timeout_secs(0)
            .validated()
            .unwrap_err();
        assert!(error.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert!(serde_json::from_str::<ClientConfig>(r#"{"unknown": 1}"#).is_err());
    }
}
