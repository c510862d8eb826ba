use std::io;

use simplenote_core::api::ApiError;
use simplenote_core::config::ConfigError;
use simplenote_core::sync::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] simplenote_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("Edited note content cannot be empty")]
    EmptyEditedContent,
    #[error("Note ID cannot be empty")]
    EmptyNoteId,
    #[error("Invalid note ID: {0}")]
    InvalidNoteId(String),
    #[error("Note not found: {0}")]
    NoteNotFound(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CliError {
    /// Stored credentials no longer work and the user has to log in again.
    pub fn is_auth_required(&self) -> bool {
        match self {
            Self::Sync(error) => error.is_auth_required(),
            Self::Api(error) => error.is_auth_required(),
            _ => false,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(error: ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}
