//! simplenote-core - Core library for SimpleNote
//!
//! This crate contains the note models, the local note cache, the
//! authenticated API pipeline and the sync engine used by every SimpleNote
//! front end.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod state;
pub mod sync;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use models::{Note, NoteId};
pub use state::{SyncState, SyncStatus};
