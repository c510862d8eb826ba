use simplenote_core::sync::SyncEngine;

use crate::commands::common::{find_note, format_sync_timestamp, note_to_list_item};
use crate::error::CliError;

pub fn run_show(engine: &SyncEngine, id: &str, as_json: bool) -> Result<(), CliError> {
    let note = find_note(engine, id)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&note_to_list_item(&note))?);
        return Ok(());
    }

    println!("# {}", note.title);
    println!();
    println!("{}", note.content);
    println!();
    println!("Updated {}", format_sync_timestamp(note.updated_at));
    if let Some(error) = engine.pending_error(note.id) {
        println!("Not synced: {error}");
    } else if note.is_pending() {
        println!("Not synced yet");
    }
    Ok(())
}
