use simplenote_core::sync::SyncEngine;
use simplenote_core::Note;

use crate::commands::common::{capture_editor_input_with_initial, find_note};
use crate::error::CliError;

pub async fn run_edit(engine: &SyncEngine, id: &str, title: Option<&str>) -> Result<(), CliError> {
    let note = find_note(engine, id)?;

    let Some(edited_content) = capture_editor_input_with_initial(&note.content)? else {
        return Err(CliError::EmptyEditedContent);
    };
    let title = title.map_or(note.title.as_str(), str::trim);

    apply_edit(engine, &note, title, &edited_content).await
}

pub(crate) async fn apply_edit(
    engine: &SyncEngine,
    note: &Note,
    title: &str,
    content: &str,
) -> Result<(), CliError> {
    if note.has_text(title, content) {
        println!("{}", note.id);
        return Ok(());
    }

    let updated = engine.update(note.id, title, content).await?;
    println!("{}", updated.id);
    Ok(())
}
