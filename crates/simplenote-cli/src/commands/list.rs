use simplenote_core::sync::{ReconcileOutcome, SyncEngine};

use crate::commands::common::{format_note_lines, note_to_list_item, NoteListItem};
use crate::error::CliError;

pub async fn run_list(
    engine: &SyncEngine,
    limit: usize,
    sync_first: bool,
    as_json: bool,
) -> Result<(), CliError> {
    if sync_first {
        if let ReconcileOutcome::Failed(error) = engine.reconcile().await {
            if error.is_auth_required() {
                return Err(error.into());
            }
            eprintln!("Showing cached notes; sync failed: {error}");
        }
    }

    let mut notes = engine.notes()?;
    notes.truncate(limit);

    if as_json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}
