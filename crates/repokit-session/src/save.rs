//! Flushing pending entries to the store.

use repokit_core::{Cx, Error, Outcome, check_cancelled, try_result};
use repokit_query::{Change, Store};

use crate::TrackingSession;
use crate::concurrency::expected_token;
use crate::registry::{EntryId, EntryState, TrackedEntry};

impl<S: Store> TrackingSession<S> {
    /// Write every pending entry in one atomic store call.
    ///
    /// Runs change detection first when `auto_detect_changes` is on. Deletes
    /// are sent first (to respect foreign keys), then inserts, then updates.
    /// On success inserted and updated entries take the stored values
    /// (generated keys and fresh tokens) and become `Unchanged`; deleted
    /// entries are forgotten. On failure or cancellation nothing changes.
    ///
    /// Returns the number of records written.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn save_changes(&mut self, cx: &Cx) -> Outcome<usize, Error> {
        try_result!(self.ensure_open());
        check_cancelled!(cx);

        let start = std::time::Instant::now();
        if self.config.auto_detect_changes {
            self.detect_changes();
        }

        let plan = self.change_plan();
        if plan.is_empty() {
            tracing::debug!("No pending changes to save");
            return Outcome::Ok(0);
        }

        let (ids, changes): (Vec<EntryId>, Vec<Change>) = plan.into_iter().unzip();
        tracing::info!(
            deletes = changes.iter().filter(|c| matches!(c, Change::Delete { .. })).count(),
            inserts = changes.iter().filter(|c| matches!(c, Change::Insert { .. })).count(),
            updates = changes.iter().filter(|c| matches!(c, Change::Update { .. })).count(),
            "Saving changes"
        );

        let store = try_result!(self.store());
        let stored = match store.save(cx, &changes).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => {
                if e.is_concurrency_conflict() {
                    tracing::warn!(error = %e, "Commit rejected by concurrency check");
                }
                return Outcome::Err(e);
            }
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        // The store has committed; from here on every entry is accepted even
        // when its record cannot take the stored values back.
        for ((id, change), row) in ids.iter().zip(&changes).zip(stored) {
            if let Change::Delete { .. } = change {
                self.registry.remove(*id);
                continue;
            }
            if let Some(entry) = self.registry.get_mut(*id) {
                if let Err(e) = entry.record.apply(&row) {
                    tracing::warn!(
                        entity = entry.caps.table(),
                        error = %e,
                        "Stored row could not be applied to the tracked record"
                    );
                }
                entry.accept();
            }
            if let Err(e) = self.registry.rekey(*id) {
                tracing::warn!(error = %e, "Saved entry keeps its previous identity");
            }
        }

        tracing::info!(
            written = changes.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Changes saved"
        );
        Outcome::Ok(changes.len())
    }

    /// Pending entries as store changes: deletes, inserts, then updates,
    /// each group in attach order.
    fn change_plan(&self) -> Vec<(EntryId, Change)> {
        let mut deletes = Vec::new();
        let mut inserts = Vec::new();
        let mut updates = Vec::new();

        for (id, entry) in self.registry.iter() {
            match entry.state {
                EntryState::Deleted => deletes.push((id, delete_change(entry))),
                EntryState::Added => inserts.push((id, insert_change(entry))),
                EntryState::Modified => updates.push((id, update_change(entry))),
                EntryState::Unchanged | EntryState::Detached => {}
            }
        }

        deletes.extend(inserts);
        deletes.extend(updates);
        deletes
    }
}

fn insert_change(entry: &TrackedEntry) -> Change {
    Change::Insert {
        entity: entry.caps.entity,
        row: entry.record.row(),
    }
}

fn update_change(entry: &TrackedEntry) -> Change {
    let row = entry.record.row();
    Change::Update {
        entity: entry.caps.entity,
        key: entry.caps.key_of(&entry.snapshot),
        row,
        expected_token: expected_token(entry),
    }
}

fn delete_change(entry: &TrackedEntry) -> Change {
    Change::Delete {
        entity: entry.caps.entity,
        key: entry.caps.key_of(&entry.snapshot),
        expected_token: expected_token(entry),
    }
}
