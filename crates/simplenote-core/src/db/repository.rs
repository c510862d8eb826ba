//! Note cache implementation

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::models::{Note, NoteId};
use crate::sync::{ReconcileDelta, ReconcilePlan};
use rusqlite::{params, Connection, OptionalExtension};

use super::Database;

const NOTE_COLUMNS: &str = "id, title, content, created_at, updated_at";

/// Local store of notes keyed by id.
///
/// Every method is a short synchronous transaction; implementations must be
/// safe to share between tasks.
pub trait NoteCache: Send + Sync {
    /// Get a note by ID
    fn get(&self, id: NoteId) -> Result<Option<Note>>;

    /// All notes, most recently updated first
    fn list(&self) -> Result<Vec<Note>>;

    /// Insert a note, replacing any row with the same id
    fn insert(&self, note: &Note) -> Result<()>;

    /// Replace title and content; `None` when the note does not exist
    fn update_text(
        &self,
        id: NoteId,
        title: &str,
        content: &str,
        updated_at: i64,
    ) -> Result<Option<Note>>;

    /// Delete a note, reporting whether it existed
    fn remove(&self, id: NoteId) -> Result<bool>;

    /// Move the placeholder row to the server-assigned id of `created`.
    ///
    /// The row keeps its local title and content. A row already holding the
    /// server id is replaced. Returns `None` when the placeholder is gone.
    fn confirm(&self, placeholder: NoteId, created: &Note) -> Result<Option<Note>>;

    /// Replace the cached server notes by `remote` in one transaction,
    /// leaving placeholders and ids in `skip` alone
    fn reconcile(&self, remote: &[Note], skip: &HashSet<NoteId>) -> Result<ReconcileDelta>;

    /// Smallest id in the cache
    fn lowest_id(&self) -> Result<Option<NoteId>>;
}

/// `SQLite` implementation of `NoteCache`
pub struct SqliteNoteCache {
    conn: Mutex<Connection>,
}

impl SqliteNoteCache {
    pub fn new(database: Database) -> Self {
        Self {
            conn: Mutex::new(database.into_connection()),
        }
    }

    /// In-memory cache (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("note cache lock poisoned".into()))
    }

    /// Parse a note from a database row
    fn parse_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
        Ok(Note {
            id: NoteId::new(row.get(0)?),
            title: row.get(1)?,
            content: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn select_one(conn: &Connection, id: NoteId) -> Result<Option<Note>> {
        let note = conn
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?"),
                params![id.get()],
                Self::parse_note,
            )
            .optional()?;
        Ok(note)
    }

    fn select_all(conn: &Connection) -> Result<Vec<Note>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes ORDER BY updated_at DESC, id DESC"
        ))?;
        let notes = stmt
            .query_map([], Self::parse_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    fn upsert(conn: &Connection, note: &Note) -> Result<()> {
        conn.execute(
            "INSERT INTO notes (id, title, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
            params![
                note.id.get(),
                note.title,
                note.content,
                note.created_at,
                note.updated_at
            ],
        )?;
        Ok(())
    }
}

impl NoteCache for SqliteNoteCache {
    fn get(&self, id: NoteId) -> Result<Option<Note>> {
        Self::select_one(&*self.conn()?, id)
    }

    fn list(&self) -> Result<Vec<Note>> {
        Self::select_all(&*self.conn()?)
    }

    fn insert(&self, note: &Note) -> Result<()> {
        Self::upsert(&*self.conn()?, note)
    }

    fn update_text(
        &self,
        id: NoteId,
        title: &str,
        content: &str,
        updated_at: i64,
    ) -> Result<Option<Note>> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE notes SET title = ?, content = ?, updated_at = ? WHERE id = ?",
            params![title, content, updated_at, id.get()],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        Self::select_one(&conn, id)
    }

    fn remove(&self, id: NoteId) -> Result<bool> {
        let rows = self
            .conn()?
            .execute("DELETE FROM notes WHERE id = ?", params![id.get()])?;
        Ok(rows > 0)
    }

    fn confirm(&self, placeholder: NoteId, created: &Note) -> Result<Option<Note>> {
        if !created.id.is_remote() {
            return Err(Error::InvalidInput(format!(
                "cannot confirm note with id {}",
                created.id
            )));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let Some(pending) = Self::select_one(&tx, placeholder)? else {
            return Ok(None);
        };

        // Local edits made while the create was in flight win over the
        // server's copy; the timestamp only moves when the text agrees.
        let updated_at = if pending.has_text(&created.title, &created.content) {
            created.updated_at
        } else {
            pending.updated_at
        };
        let confirmed = Note {
            id: created.id,
            title: pending.title,
            content: pending.content,
            created_at: created.created_at,
            updated_at,
        };

        tx.execute("DELETE FROM notes WHERE id = ?", params![placeholder.get()])?;
        Self::upsert(&tx, &confirmed)?;
        tx.commit()?;
        Ok(Some(confirmed))
    }

    fn reconcile(&self, remote: &[Note], skip: &HashSet<NoteId>) -> Result<ReconcileDelta> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let local = Self::select_all(&tx)?;
        let plan = ReconcilePlan::between(&local, remote, skip);

        for note in &plan.writes {
            Self::upsert(&tx, note)?;
        }
        for id in &plan.delta.removed {
            tx.execute("DELETE FROM notes WHERE id = ?", params![id.get()])?;
        }
        tx.commit()?;

        Ok(plan.delta)
    }

    fn lowest_id(&self) -> Result<Option<NoteId>> {
        let lowest: Option<i64> = self
            .conn()?
            .query_row("SELECT MIN(id) FROM notes", [], |row| row.get(0))?;
        Ok(lowest.map(NoteId::new))
    }
}
