//! Wire representation of notes exchanged with the remote collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::note::{Note, NoteId};

/// A note as the server returns it.
///
/// The server calls the body `description`; locally it is `content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNote {
    pub id: i64,
    pub title: String,
    #[serde(rename = "description")]
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RemoteNote {
    #[must_use]
    pub const fn note_id(&self) -> NoteId {
        NoteId::new(self.id)
    }
}

impl From<RemoteNote> for Note {
    fn from(remote: RemoteNote) -> Self {
        Self {
            id: remote.note_id(),
            title: remote.title,
            content: remote.content,
            created_at: remote.created_at.timestamp_millis(),
            updated_at: remote.updated_at.timestamp_millis(),
        }
    }
}

/// Body of `GET notes/`: either a paginated envelope or a bare array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RemoteNoteListing {
    Page {
        results: Vec<RemoteNote>,
        #[serde(default)]
        next: Option<String>,
    },
    Bare(Vec<RemoteNote>),
}

impl RemoteNoteListing {
    /// Split into the notes on this page and the URL of the next page.
    #[must_use]
    pub fn into_parts(self) -> (Vec<RemoteNote>, Option<String>) {
        match self {
            Self::Page { results, next } => (results, next.filter(|next| !next.trim().is_empty())),
            Self::Bare(results) => (results, None),
        }
    }
}
