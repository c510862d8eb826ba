use simplenote_core::sync::{ReconcileOutcome, SyncEngine};

use crate::error::CliError;

pub async fn run_sync(engine: &SyncEngine) -> Result<(), CliError> {
    match engine.reconcile().await {
        ReconcileOutcome::Synced(delta) => {
            if delta.is_empty() {
                println!("Sync completed; already up to date");
            } else {
                println!(
                    "Sync completed: {} added, {} updated, {} removed",
                    delta.inserted.len(),
                    delta.updated.len(),
                    delta.removed.len()
                );
            }
            let pending = engine.pending_errors();
            if !pending.is_empty() {
                println!("{} note(s) have changes the server has not accepted", pending.len());
            }
            Ok(())
        }
        ReconcileOutcome::Failed(error) => Err(error.into()),
    }
}
