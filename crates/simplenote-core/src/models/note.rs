//! Note model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use crate::util::unix_millis_now;

/// Identity of a cached note.
///
/// Positive values are assigned by the server. Negative values are local
/// placeholders for notes whose remote creation has not been acknowledged yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(i64);

impl NoteId {
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// True for locally generated ids that the server has never seen.
    #[must_use]
    pub const fn is_placeholder(self) -> bool {
        self.0 < 0
    }

    /// True for ids that address a note in the remote collection.
    #[must_use]
    pub const fn is_remote(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// A note in the local cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Note {
    /// Create a note stamped with the current time.
    #[must_use]
    pub fn new(id: NoteId, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id,
            title: title.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the user-editable fields equal the given values.
    #[must_use]
    pub fn has_text(&self, title: &str, content: &str) -> bool {
        self.title == title && self.content == content
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.id.is_placeholder()
    }

    /// Title, or the first content line when the title is blank, truncated to
    /// `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        let source = if self.title.trim().is_empty() {
            self.content.lines().next().unwrap_or("")
        } else {
            self.title.as_str()
        };
        source.trim().chars().take(max_len).collect()
    }
}
