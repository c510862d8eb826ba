use simplenote_core::sync::{SyncEngine, SyncError};

use crate::commands::common::{resolve_note_content, split_title};
use crate::error::CliError;

pub async fn run_add(
    engine: &SyncEngine,
    title: Option<&str>,
    content_parts: &[String],
) -> Result<(), CliError> {
    let text = resolve_note_content(content_parts)?;
    let (title, content) = split_title(title, &text);

    match engine.create(&title, &content).await {
        Ok(note) => {
            println!("{}", note.id);
            Ok(())
        }
        Err(error @ SyncError::Remote { note_id, .. }) => {
            eprintln!("Saved locally as {note_id}, but the server did not accept it.");
            Err(error.into())
        }
        Err(error) => Err(error.into()),
    }
}
