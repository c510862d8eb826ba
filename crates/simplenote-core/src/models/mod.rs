//! Data models for SimpleNote

mod note;
mod remote;
mod user;

pub use note::{Note, NoteId};
pub use remote::{RemoteNote, RemoteNoteListing};
pub use user::{SignupRequest, UserProfile};
