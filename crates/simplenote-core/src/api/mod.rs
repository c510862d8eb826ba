//! Remote API plumbing: the error taxonomy, request/response types, the HTTP
//! transport seam and the remote note collection client.

mod notes;
mod request;
mod transport;

pub use notes::{HttpNoteClient, RemoteNoteClient};
pub use request::{ApiRequest, ApiResponse, Method};
pub use transport::{HttpTransport, ReqwestTransport};

use thiserror::Error;

use crate::auth::StoreError;

/// Failures surfaced by the authenticated API pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Login rejected the username/password.
    #[error("Incorrect username and/or password.")]
    InvalidCredentials,
    /// No usable or refreshable credential; the user must log in again.
    #[error("Authentication required. Please log in again.")]
    AuthRequired,
    /// Transport failure or non-2xx response.
    #[error("A network error occurred: {0}")]
    Network(String),
    /// The server returned a payload we could not decode.
    #[error("A server-side problem occurred: {0}")]
    Decoding(String),
    /// Credentials could not be persisted.
    #[error("Secure storage error: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding(message.into())
    }

    pub const fn is_auth_required(&self) -> bool {
        matches!(self, Self::AuthRequired)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self::Storage(error.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
