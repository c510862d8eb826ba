//! Reconciliation planning.
//!
//! Computing the changes is kept separate from applying them so the set
//! arithmetic can be tested without a database.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::{Note, NoteId};

/// What a reconcile changed in the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileDelta {
    pub inserted: Vec<NoteId>,
    pub updated: Vec<NoteId>,
    pub removed: Vec<NoteId>,
}

impl ReconcileDelta {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Writes that bring a local note set in line with the remote collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Notes to insert or overwrite, keyed by id.
    pub writes: Vec<Note>,
    pub delta: ReconcileDelta,
}

impl ReconcilePlan {
    /// Plan the replacement of `local` by `remote`.
    ///
    /// - remote notes missing locally are inserted;
    /// - local notes whose title, content or `updated_at` differ from the
    ///   remote copy are overwritten, keeping their local `created_at`;
    /// - local notes with a server id absent from `remote` are removed;
    /// - placeholder ids are never touched;
    /// - ids in `skip` were written locally after `remote` was fetched, or
    ///   still wait on a server call, and are left as they are.
    pub fn between(local: &[Note], remote: &[Note], skip: &HashSet<NoteId>) -> Self {
        let local_by_id: HashMap<NoteId, &Note> =
            local.iter().map(|note| (note.id, note)).collect();
        // Later duplicates win; ordering keeps the plan deterministic.
        let remote_by_id: BTreeMap<NoteId, &Note> = remote
            .iter()
            .filter(|note| note.id.is_remote())
            .map(|note| (note.id, note))
            .collect();

        let mut plan = Self::default();
        for (id, incoming) in &remote_by_id {
            if skip.contains(id) {
                continue;
            }
            match local_by_id.get(id) {
                None => {
                    plan.writes.push((*incoming).clone());
                    plan.delta.inserted.push(*id);
                }
                Some(existing) if differs(existing, incoming) => {
                    plan.writes.push(Note {
                        id: *id,
                        title: incoming.title.clone(),
                        content: incoming.content.clone(),
                        created_at: existing.created_at,
                        updated_at: incoming.updated_at,
                    });
                    plan.delta.updated.push(*id);
                }
                Some(_) => {}
            }
        }

        let mut removed = local
            .iter()
            .map(|note| note.id)
            .filter(|id| id.is_remote() && !remote_by_id.contains_key(id) && !skip.contains(id))
            .collect::<Vec<_>>();
        removed.sort_unstable();
        plan.delta.removed = removed;

        plan
    }
}

fn differs(local: &Note, remote: &Note) -> bool {
    !local.has_text(&remote.title, &remote.content) || local.updated_at != remote.updated_at
}
