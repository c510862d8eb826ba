//! Test doubles shared across unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::Semaphore;

use crate::api::{
    ApiError, ApiRequest, ApiResponse, ApiResult, HttpTransport, Method, RemoteNoteClient,
};
use crate::models::{NoteId, RemoteNote};

type Handler =
    Box<dyn Fn(ApiRequest) -> BoxFuture<'static, ApiResult<ApiResponse>> + Send + Sync>;

/// Transport that answers from a closure and records every request.
pub struct FakeTransport {
    handler: Handler,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest) -> ApiResult<ApiResponse> + Send + Sync + 'static,
    {
        Self::new_async(move |request| {
            let result = handler(&request);
            async move { result }.boxed()
        })
    }

    pub fn new_async<F>(handler: F) -> Arc<Self>
    where
        F: Fn(ApiRequest) -> BoxFuture<'static, ApiResult<ApiResponse>> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.method == method && request.path == path)
            .count()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        self.requests.lock().unwrap().push(request.clone());
        (self.handler)(request).await
    }
}

pub fn json_response(status: u16, body: serde_json::Value) -> ApiResult<ApiResponse> {
    Ok(ApiResponse::new(status, body.to_string()))
}

pub fn timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap()
}

pub fn remote_note(id: i64, title: &str, content: &str) -> RemoteNote {
    RemoteNote {
        id,
        title: title.to_string(),
        content: content.to_string(),
        created_at: timestamp(1_700_000_000_000 + id),
        updated_at: timestamp(1_700_000_000_000 + id),
    }
}

pub fn remote_note_json(id: i64, title: &str, content: &str) -> serde_json::Value {
    serde_json::to_value(remote_note(id, title, content)).unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    List,
    Create { title: String, content: String },
    Update { id: i64, title: String, content: String },
    Delete(i64),
}

/// In-memory remote collection with call recording, injectable failures and
/// optional gates that hold creates, updates or deletes until released.
pub struct FakeRemote {
    notes: Mutex<BTreeMap<i64, RemoteNote>>,
    next_id: AtomicI64,
    calls: Mutex<Vec<RemoteCall>>,
    failure: Mutex<Option<ApiError>>,
    create_gate: Option<Arc<Semaphore>>,
    update_gate: Option<Arc<Semaphore>>,
    delete_gate: Option<Arc<Semaphore>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(Vec::new()))
    }

    pub fn with_notes(notes: Vec<RemoteNote>) -> Arc<Self> {
        Arc::new(Self::build(notes))
    }

    /// Creates block until a permit is added to the returned semaphore.
    pub fn with_held_creates(notes: Vec<RemoteNote>) -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let remote = Self {
            create_gate: Some(Arc::clone(&gate)),
            ..Self::build(notes)
        };
        (Arc::new(remote), gate)
    }

    /// Updates block until a permit is added to the returned semaphore.
    pub fn with_held_updates(notes: Vec<RemoteNote>) -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let remote = Self {
            update_gate: Some(Arc::clone(&gate)),
            ..Self::build(notes)
        };
        (Arc::new(remote), gate)
    }

    /// Deletes block until a permit is added to the returned semaphore.
    pub fn with_held_deletes(notes: Vec<RemoteNote>) -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let remote = Self {
            delete_gate: Some(Arc::clone(&gate)),
            ..Self::build(notes)
        };
        (Arc::new(remote), gate)
    }

    fn build(notes: Vec<RemoteNote>) -> Self {
        let next_id = notes.iter().map(|note| note.id).max().unwrap_or(0) + 1;
        Self {
            notes: Mutex::new(notes.into_iter().map(|note| (note.id, note)).collect()),
            next_id: AtomicI64::new(next_id),
            calls: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            create_gate: None,
            update_gate: None,
            delete_gate: None,
        }
    }

    /// Every subsequent call fails with `error` until cleared with `None`.
    pub fn fail_with(&self, error: Option<ApiError>) {
        *self.failure.lock().unwrap() = error;
    }

    pub fn seed(&self, note: RemoteNote) {
        self.notes.lock().unwrap().insert(note.id, note);
    }

    pub fn remove(&self, id: i64) {
        self.notes.lock().unwrap().remove(&id);
    }

    pub fn note(&self, id: i64) -> Option<RemoteNote> {
        self.notes.lock().unwrap().get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.notes.lock().unwrap().keys().copied().collect()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&RemoteCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: RemoteCall) -> ApiResult<()> {
        self.calls.lock().unwrap().push(call);
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

async fn hold(gate: Option<&Arc<Semaphore>>) {
    if let Some(gate) = gate {
        gate.acquire().await.unwrap().forget();
    }
}

#[async_trait]
impl RemoteNoteClient for FakeRemote {
    async fn list(&self) -> ApiResult<Vec<RemoteNote>> {
        self.record(RemoteCall::List)?;
        Ok(self.notes.lock().unwrap().values().cloned().collect())
    }

    async fn create(&self, title: &str, content: &str) -> ApiResult<RemoteNote> {
        hold(self.create_gate.as_ref()).await;
        self.record(RemoteCall::Create {
            title: title.to_string(),
            content: content.to_string(),
        })?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let note = RemoteNote {
            id,
            title: title.to_string(),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.notes.lock().unwrap().insert(id, note.clone());
        Ok(note)
    }

    async fn update(&self, id: NoteId, title: &str, content: &str) -> ApiResult<RemoteNote> {
        hold(self.update_gate.as_ref()).await;
        self.record(RemoteCall::Update {
            id: id.get(),
            title: title.to_string(),
            content: content.to_string(),
        })?;
        let mut notes = self.notes.lock().unwrap();
        let note = notes
            .get_mut(&id.get())
            .ok_or_else(|| ApiError::network("Not found. (404)"))?;
        note.title = title.to_string();
        note.content = content.to_string();
        note.updated_at = Utc::now();
        Ok(note.clone())
    }

    async fn delete(&self, id: NoteId) -> ApiResult<()> {
        hold(self.delete_gate.as_ref()).await;
        self.record(RemoteCall::Delete(id.get()))?;
        self.notes
            .lock()
            .unwrap()
            .remove(&id.get())
            .map(|_| ())
            .ok_or_else(|| ApiError::network("Not found. (404)"))
    }
}
