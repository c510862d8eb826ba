//! Remote note collection client.

use std::collections::HashSet;

use async_trait::async_trait;

use super::request::{ApiRequest, ApiResponse};
use super::{ApiError, ApiResult};
use crate::auth::AuthGateway;
use crate::models::{NoteId, RemoteNote, RemoteNoteListing};

const NOTES_PATH: &str = "notes/";

/// Operations on the remote note collection.
#[async_trait]
pub trait RemoteNoteClient: Send + Sync {
    /// The full collection, following pagination to the end.
    async fn list(&self) -> ApiResult<Vec<RemoteNote>>;
    async fn create(&self, title: &str, content: &str) -> ApiResult<RemoteNote>;
    async fn update(&self, id: NoteId, title: &str, content: &str) -> ApiResult<RemoteNote>;
    async fn delete(&self, id: NoteId) -> ApiResult<()>;
}

/// `RemoteNoteClient` over the authenticated HTTP pipeline.
#[derive(Clone)]
pub struct HttpNoteClient {
    gateway: AuthGateway,
}

impl HttpNoteClient {
    pub const fn new(gateway: AuthGateway) -> Self {
        Self { gateway }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<T> {
        let body = self.gateway.perform_authenticated(request).await?;
        ApiResponse::new(200, body).json()
    }
}

fn note_path(id: NoteId) -> ApiResult<String> {
    if !id.is_remote() {
        return Err(ApiError::network(format!(
            "note {id} has not been created on the server"
        )));
    }
    Ok(format!("{NOTES_PATH}{id}/"))
}

fn note_body(title: &str, content: &str) -> serde_json::Value {
    serde_json::json!({
        "title": title,
        "description": content,
    })
}

#[async_trait]
impl RemoteNoteClient for HttpNoteClient {
    async fn list(&self) -> ApiResult<Vec<RemoteNote>> {
        let mut notes = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(NOTES_PATH.to_string());

        while let Some(path) = next.take() {
            if !visited.insert(path.clone()) {
                tracing::warn!(%path, "Pagination loop detected; stopping");
                break;
            }
            let listing: RemoteNoteListing = self.fetch(ApiRequest::get(path)).await?;
            let (page, following) = listing.into_parts();
            notes.extend(page);
            next = following;
        }

        tracing::debug!(count = notes.len(), "Fetched remote notes");
        Ok(notes)
    }

    async fn create(&self, title: &str, content: &str) -> ApiResult<RemoteNote> {
        let request = ApiRequest::post(NOTES_PATH).json(note_body(title, content));
        let created: RemoteNote = self.fetch(request).await?;
        tracing::debug!(id = created.id, "Created remote note");
        Ok(created)
    }

    async fn update(&self, id: NoteId, title: &str, content: &str) -> ApiResult<RemoteNote> {
        let request = ApiRequest::patch(note_path(id)?).json(note_body(title, content));
        self.fetch(request).await
    }

    async fn delete(&self, id: NoteId) -> ApiResult<()> {
        self.gateway
            .perform_authenticated(ApiRequest::delete(note_path(id)?))
            .await?;
        tracing::debug!(%id, "Deleted remote note");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::Method;
    use crate::auth::{CredentialPair, MemoryCredentialStore};
    use crate::testing::{json_response, remote_note_json, FakeTransport};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn client_with(transport: Arc<FakeTransport>) -> HttpNoteClient {
        let store = Arc::new(MemoryCredentialStore::with_pair(&CredentialPair::new(
            "access-1",
            "refresh-1",
        )));
        HttpNoteClient::new(AuthGateway::new(transport, store))
    }

    #[tokio::test]
    async fn list_accepts_bare_array() {
        let transport = FakeTransport::new(|request| {
            assert_eq!(request.path, "notes/");
            json_response(
                200,
                json!([remote_note_json(1, "a", "x"), remote_note_json(2, "b", "y")]),
            )
        });
        let client = client_with(transport);

        let notes = client.list().await.unwrap();

        assert_eq!(notes.iter().map(|note| note.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn list_follows_next_links() {
        let transport = FakeTransport::new(|request| match request.path.as_str() {
            "notes/" => json_response(
                200,
                json!({
                    "results": [remote_note_json(1, "a", "x")],
                    "next": "http://localhost:8000/api/notes/?page=2",
                }),
            ),
            "http://localhost:8000/api/notes/?page=2" => json_response(
                200,
                json!({"results": [remote_note_json(2, "b", "y")], "next": null}),
            ),
            other => panic!("unexpected path {other}"),
        });
        let client = client_with(Arc::clone(&transport));

        let notes = client.list().await.unwrap();

        assert_eq!(notes.len(), 2);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn list_stops_on_repeated_next_link() {
        let transport = FakeTransport::new(|_| {
            json_response(
                200,
                json!({"results": [], "next": "notes/"}),
            )
        });
        let client = client_with(Arc::clone(&transport));

        assert!(client.list().await.unwrap().is_empty());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn list_reports_malformed_body() {
        let transport = FakeTransport::new(|_| json_response(200, json!({"notes": 1})));
        let error = client_with(transport).list().await.unwrap_err();
        assert!(matches!(error, ApiError::Decoding(_)));
    }

    #[tokio::test]
    async fn create_posts_description_field() {
        let transport = FakeTransport::new(|request| {
            assert_eq!(request.method, Method::Post);
            assert_eq!(
                request.body,
                Some(json!({"title": "Groceries", "description": "milk, eggs"}))
            );
            json_response(201, remote_note_json(42, "Groceries", "milk, eggs"))
        });

        let created = client_with(transport)
            .create("Groceries", "milk, eggs")
            .await
            .unwrap();

        assert_eq!(created.note_id(), NoteId::new(42));
        assert_eq!(created.content, "milk, eggs");
    }

    #[tokio::test]
    async fn update_patches_note_path() {
        let transport = FakeTransport::new(|request| {
            assert_eq!(request.method, Method::Patch);
            assert_eq!(request.path, "notes/42/");
            json_response(200, remote_note_json(42, "t", "c"))
        });

        client_with(transport)
            .update(NoteId::new(42), "t", "c")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_accepts_empty_body() {
        let transport = FakeTransport::new(|request| {
            assert_eq!(request.method, Method::Delete);
            assert_eq!(request.path, "notes/7/");
            Ok(ApiResponse::new(204, ""))
        });

        client_with(transport).delete(NoteId::new(7)).await.unwrap();
    }

    #[tokio::test]
    async fn placeholder_ids_never_reach_the_network() {
        let transport = FakeTransport::new(|_| Ok(ApiResponse::new(204, "")));
        let client = client_with(Arc::clone(&transport));

        assert!(client.delete(NoteId::new(-5)).await.is_err());
        assert!(client.update(NoteId::new(-5), "t", "c").await.is_err());
        assert!(transport.requests().is_empty());
    }
}
