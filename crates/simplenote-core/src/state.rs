//! Shared sync state types.

/// Coarse sync state reported by the sync engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// Never synced, or the session is no longer authenticated.
    Offline,
    Syncing,
    Synced,
    Error,
}

/// Snapshot of the sync engine's status, suitable for polling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Message of the most recent absorbed failure, if any.
    pub last_error: Option<String>,
    /// Unix ms of the last successful reconciliation.
    pub last_synced_at: Option<i64>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: SyncState::Offline,
            last_error: None,
            last_synced_at: None,
        }
    }
}
