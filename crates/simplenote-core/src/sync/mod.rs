//! Keeping the local note cache in step with the remote collection.

mod engine;
mod plan;

pub use engine::SyncEngine;
pub use plan::{ReconcileDelta, ReconcilePlan};

use thiserror::Error;

use crate::api::ApiError;
use crate::models::{Note, NoteId};
use crate::state::SyncStatus;

/// Failures of sync engine operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Cache(#[from] crate::Error),

    #[error("Note not found: {0}")]
    NotFound(NoteId),

    /// The local change was kept but the server did not accept it.
    #[error("Failed to sync note {note_id}: {source}")]
    Remote { note_id: NoteId, source: ApiError },

    #[error("Failed to fetch remote notes: {0}")]
    Fetch(#[source] ApiError),
}

impl SyncError {
    /// The underlying API failure, if any.
    pub const fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Remote { source, .. } | Self::Fetch(source) => Some(source),
            Self::Cache(_) | Self::NotFound(_) => None,
        }
    }

    /// The session is gone and the user has to log in again.
    pub fn is_auth_required(&self) -> bool {
        self.api_error().is_some_and(ApiError::is_auth_required)
    }
}

/// Change notifications published by [`SyncEngine::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Inserted(Note),
    Updated(Note),
    Removed(NoteId),
    /// A placeholder note received its server id.
    Renumbered { from: NoteId, note: Note },
    Reconciled(ReconcileDelta),
    StatusChanged(SyncStatus),
}

/// Result of a reconcile; failures are absorbed into the engine status.
#[derive(Debug)]
pub enum ReconcileOutcome {
    Synced(ReconcileDelta),
    Failed(SyncError),
}

impl ReconcileOutcome {
    pub const fn is_synced(&self) -> bool {
        matches!(self, Self::Synced(_))
    }

    pub const fn delta(&self) -> Option<&ReconcileDelta> {
        match self {
            Self::Synced(delta) => Some(delta),
            Self::Failed(_) => None,
        }
    }

    pub const fn error(&self) -> Option<&SyncError> {
        match self {
            Self::Synced(_) => None,
            Self::Failed(error) => Some(error),
        }
    }
}
