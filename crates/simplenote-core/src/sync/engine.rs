//! Sync engine: optimistic local writes propagated to the remote collection.
//!
//! Every mutation writes the cache first and then calls the server. A remote
//! failure never rolls the local change back; it is kept as a pending error on
//! the note instead. `reconcile` replaces the cached server notes by the remote
//! collection while leaving notes that have not reached the server alone.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use super::{CacheEvent, ReconcileOutcome, SyncError};
use crate::api::{ApiError, RemoteNoteClient};
use crate::db::NoteCache;
use crate::models::{Note, NoteId};
use crate::state::{SyncState, SyncStatus};
use crate::util::unix_millis_now;

const EVENT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    remote: Arc<dyn RemoteNoteClient>,
    cache: Arc<dyn NoteCache>,
    placeholders: PlaceholderIds,
    pending_errors: Mutex<HashMap<NoteId, ApiError>>,
    status: Mutex<SyncStatus>,
    /// Ids written locally since the running reconcile fetched the remote
    /// collection. Reconcile leaves them alone.
    dirty: Mutex<HashSet<NoteId>>,
    /// Ids with a local write whose server call has not finished, counted
    /// per overlapping call. Unlike `dirty`, reconcile never clears these.
    in_flight: Mutex<HashMap<NoteId, usize>>,
    reconciling: tokio::sync::Mutex<()>,
    events: broadcast::Sender<CacheEvent>,
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn RemoteNoteClient>, cache: Arc<dyn NoteCache>) -> crate::Result<Self> {
        let placeholders = PlaceholderIds::after(cache.lowest_id()?);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(EngineInner {
                remote,
                cache,
                placeholders,
                pending_errors: Mutex::new(HashMap::new()),
                status: Mutex::new(SyncStatus::default()),
                dirty: Mutex::new(HashSet::new()),
                in_flight: Mutex::new(HashMap::new()),
                reconciling: tokio::sync::Mutex::new(()),
                events,
            }),
        })
    }

    /// Replace the cached server notes by the remote collection.
    ///
    /// Never fails to the caller: the outcome is also recorded in
    /// [`status`](Self::status). Concurrent calls run one after another.
    pub async fn reconcile(&self) -> ReconcileOutcome {
        let _running = self.inner.reconciling.lock().await;
        self.update_status(|status| status.state = SyncState::Syncing);
        self.lock_dirty().clear();

        let remote = match self.inner.remote.list().await {
            Ok(remote) => remote,
            Err(error) => return self.reconcile_failed(SyncError::Fetch(error)),
        };
        let remote = remote.into_iter().map(Note::from).collect::<Vec<_>>();

        let applied = {
            let mut skip = self.lock_dirty().clone();
            skip.extend(self.lock_in_flight().keys().copied());
            self.inner.cache.reconcile(&remote, &skip)
        };
        let delta = match applied {
            Ok(delta) => delta,
            Err(error) => return self.reconcile_failed(SyncError::Cache(error)),
        };

        {
            let mut pending = self.lock_pending();
            for id in delta.updated.iter().chain(&delta.removed) {
                pending.remove(id);
            }
        }
        tracing::info!(
            remote = remote.len(),
            inserted = delta.inserted.len(),
            updated = delta.updated.len(),
            removed = delta.removed.len(),
            "Reconciled note cache"
        );
        self.update_status(|status| {
            status.state = SyncState::Synced;
            status.last_error = None;
            status.last_synced_at = Some(unix_millis_now());
        });
        if !delta.is_empty() {
            self.emit(CacheEvent::Reconciled(delta.clone()));
        }
        ReconcileOutcome::Synced(delta)
    }

    /// Create a note locally under a placeholder id, then on the server.
    ///
    /// On success the same note is returned under its server id. On failure
    /// the placeholder note stays in the cache with a pending error.
    pub async fn create(&self, title: &str, content: &str) -> Result<Note, SyncError> {
        let placeholder = Note::new(self.inner.placeholders.next(), title, content);
        self.inner.cache.insert(&placeholder)?;
        tracing::debug!(id = %placeholder.id, "Created local note");
        self.emit(CacheEvent::Inserted(placeholder.clone()));

        let created = match self.inner.remote.create(title, content).await {
            Ok(created) => Note::from(created),
            Err(error) => return Err(self.record_failure(placeholder.id, error)),
        };

        let _in_flight = self.track_in_flight(created.id);
        self.mark_dirty(created.id);
        let Some(confirmed) = self.inner.cache.confirm(placeholder.id, &created)? else {
            self.lock_pending().remove(&placeholder.id);
            tracing::info!(
                id = %created.id,
                "Note was deleted while being created; removing server copy"
            );
            if let Err(error) = self.inner.remote.delete(created.id).await {
                return Err(self.remote_failure(created.id, error));
            }
            return Err(SyncError::NotFound(placeholder.id));
        };

        self.lock_pending().remove(&placeholder.id);
        tracing::debug!(from = %placeholder.id, to = %confirmed.id, "Note confirmed by server");
        self.emit(CacheEvent::Renumbered {
            from: placeholder.id,
            note: confirmed.clone(),
        });

        if confirmed.has_text(&created.title, &created.content) {
            Ok(confirmed)
        } else {
            tracing::debug!(id = %confirmed.id, "Note edited during creation; sending edits");
            self.push_update(confirmed).await
        }
    }

    /// Change a note's title and content.
    ///
    /// Identical text is a no-op. Placeholder notes are only updated locally;
    /// their text is sent when the server confirms them.
    pub async fn update(&self, id: NoteId, title: &str, content: &str) -> Result<Note, SyncError> {
        let current = self.inner.cache.get(id)?.ok_or(SyncError::NotFound(id))?;
        if current.has_text(title, content) {
            tracing::debug!(%id, "Note unchanged; skipping update");
            return Ok(current);
        }

        let _in_flight = self.track_in_flight(id);
        self.mark_dirty(id);
        let updated_at = unix_millis_now().max(current.updated_at);
        let updated = self
            .inner
            .cache
            .update_text(id, title, content, updated_at)?
            .ok_or(SyncError::NotFound(id))?;
        self.emit(CacheEvent::Updated(updated.clone()));

        if id.is_placeholder() {
            return Ok(updated);
        }
        self.push_update(updated).await
    }

    /// Remove a note locally, then on the server when it has a server id.
    pub async fn delete(&self, id: NoteId) -> Result<(), SyncError> {
        let _in_flight = self.track_in_flight(id);
        self.mark_dirty(id);
        if !self.inner.cache.remove(id)? {
            return Err(SyncError::NotFound(id));
        }
        self.lock_pending().remove(&id);
        tracing::debug!(%id, "Deleted local note");
        self.emit(CacheEvent::Removed(id));

        if !id.is_remote() {
            return Ok(());
        }
        self.inner
            .remote
            .delete(id)
            .await
            .map_err(|error| self.remote_failure(id, error))
    }

    /// Cached notes, most recently updated first.
    pub fn notes(&self) -> Result<Vec<Note>, SyncError> {
        Ok(self.inner.cache.list()?)
    }

    pub fn note(&self, id: NoteId) -> Result<Option<Note>, SyncError> {
        Ok(self.inner.cache.get(id)?)
    }

    /// The last remote failure recorded for a note that is still cached.
    pub fn pending_error(&self, id: NoteId) -> Option<ApiError> {
        self.lock_pending().get(&id).cloned()
    }

    pub fn pending_errors(&self) -> HashMap<NoteId, ApiError> {
        self.lock_pending().clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    async fn push_update(&self, note: Note) -> Result<Note, SyncError> {
        let _in_flight = self.track_in_flight(note.id);
        match self
            .inner
            .remote
            .update(note.id, &note.title, &note.content)
            .await
        {
            Ok(_) => {
                self.mark_dirty(note.id);
                self.lock_pending().remove(&note.id);
                Ok(note)
            }
            Err(error) => Err(self.record_failure(note.id, error)),
        }
    }

    fn reconcile_failed(&self, error: SyncError) -> ReconcileOutcome {
        tracing::warn!("Reconcile failed: {}", error);
        let message = error.to_string();
        let state = if error.is_auth_required() {
            SyncState::Offline
        } else {
            SyncState::Error
        };
        self.update_status(|status| {
            status.state = state;
            status.last_error = Some(message);
        });
        ReconcileOutcome::Failed(error)
    }

    /// Remote failure for a note that stays cached.
    fn record_failure(&self, id: NoteId, error: ApiError) -> SyncError {
        self.lock_pending().insert(id, error.clone());
        self.remote_failure(id, error)
    }

    fn remote_failure(&self, id: NoteId, error: ApiError) -> SyncError {
        tracing::warn!(%id, "Remote change failed: {}", error);
        if error.is_auth_required() {
            let message = error.to_string();
            self.update_status(|status| {
                status.state = SyncState::Offline;
                status.last_error = Some(message);
            });
        }
        SyncError::Remote {
            note_id: id,
            source: error,
        }
    }

    fn update_status(&self, change: impl FnOnce(&mut SyncStatus)) {
        let snapshot = {
            let mut status = self
                .inner
                .status
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let before = status.clone();
            change(&mut *status);
            if *status == before {
                return;
            }
            status.clone()
        };
        self.emit(CacheEvent::StatusChanged(snapshot));
    }

    fn mark_dirty(&self, id: NoteId) {
        self.lock_dirty().insert(id);
    }

    /// Keep reconcile away from `id` until the returned guard is dropped.
    fn track_in_flight(&self, id: NoteId) -> InFlight<'_> {
        *self.lock_in_flight().entry(id).or_insert(0) += 1;
        InFlight { engine: self, id }
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn lock_dirty(&self) -> MutexGuard<'_, HashSet<NoteId>> {
        self.inner
            .dirty
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<NoteId, usize>> {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<NoteId, ApiError>> {
        self.inner
            .pending_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

struct InFlight<'a> {
    engine: &'a SyncEngine,
    id: NoteId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.engine.lock_in_flight();
        if let Some(count) = in_flight.get_mut(&self.id) {
            *count -= 1;
            if *count == 0 {
                in_flight.remove(&self.id);
            }
        }
    }
}

/// Allocates placeholder ids from the negated wall clock, strictly decreasing
/// within the process and below every id already cached.
struct PlaceholderIds {
    last: AtomicI64,
}

impl PlaceholderIds {
    fn after(lowest: Option<NoteId>) -> Self {
        Self {
            last: AtomicI64::new(lowest.map_or(0, |id| id.get().min(0))),
        }
    }

    fn next(&self) -> NoteId {
        let now = unix_millis_now();
        let candidate = |last: i64| (-now).min(last.saturating_sub(1));
        let previous = match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(candidate(last)))
        {
            Ok(previous) | Err(previous) => previous,
        };
        NoteId::new(candidate(previous))
    }
}
