use simplenote_core::sync::SyncEngine;

use crate::commands::common::find_note;
use crate::error::CliError;

pub async fn run_delete(engine: &SyncEngine, id: &str) -> Result<(), CliError> {
    let note = find_note(engine, id)?;

    engine.delete(note.id).await?;
    println!("{}", note.id);
    Ok(())
}
