//! Local note cache backed by `SQLite`

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{NoteCache, SqliteNoteCache};
