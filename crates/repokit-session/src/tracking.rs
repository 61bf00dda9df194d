//! Entry registration and state transitions.

use std::any::TypeId;

use chrono::Utc;
use repokit_core::{Error, Record, Result, Row};
use repokit_query::Store;

use crate::TrackingSession;
use crate::concurrency::ConcurrencyToken;
use crate::entry::EntryMut;
use crate::registry::{EntryId, EntryState, TrackedEntry};

impl<S: Store> TrackingSession<S> {
    // ========================================================================
    // Lookup
    // ========================================================================

    /// Entry tracking `record`, if any.
    pub fn find_entry<T: Record>(&mut self, record: &T) -> Result<Option<EntryId>> {
        let caps = self.capabilities::<T>()?;
        Ok(self
            .registry
            .locate(TypeId::of::<T>(), &caps, &record.to_owned_row()))
    }

    /// Tracking state of `record`; `Detached` when not tracked.
    pub fn state_of<T: Record>(&mut self, record: &T) -> Result<EntryState> {
        let id = self.find_entry(record)?;
        Ok(id
            .and_then(|id| self.registry.get(id))
            .map_or(EntryState::Detached, |e| e.state))
    }

    /// The tracked entry of `record`.
    pub fn entry<T: Record>(&mut self, record: &T) -> Result<Option<EntryMut<'_, T>>> {
        let id = self.find_entry(record)?;
        Ok(id.map(|id| EntryMut::new(&mut self.registry, id)))
    }

    /// The tracked entry with id `id`, if it is still tracked and holds a `T`.
    pub fn entry_by_id<T: Record>(&mut self, id: EntryId) -> Option<EntryMut<'_, T>> {
        let holds_t = self
            .registry
            .get(id)
            .is_some_and(|e| e.type_id == TypeId::of::<T>());
        holds_t.then(|| EntryMut::new(&mut self.registry, id))
    }

    /// Clones of every tracked `T`, in attach order.
    pub fn tracked<T: Record>(&self) -> Vec<T> {
        self.registry
            .iter()
            .filter_map(|(_, e)| e.downcast::<T>())
            .cloned()
            .collect()
    }

    /// Whether any tracked `T` satisfies `predicate`.
    pub fn is_tracked_where<T: Record>(&self, predicate: impl Fn(&T) -> bool) -> bool {
        self.registry
            .iter()
            .filter_map(|(_, e)| e.downcast::<T>())
            .any(predicate)
    }

    // ========================================================================
    // Attach and State Transitions
    // ========================================================================

    /// Start tracking `record` in `state`.
    ///
    /// Fails with `IdentityConflict` if its key is already tracked.
    pub fn attach<T: Record>(&mut self, record: T, state: EntryState) -> Result<EntryId> {
        self.ensure_open()?;
        let caps = self.capabilities::<T>()?;
        let entry = TrackedEntry::new(TypeId::of::<T>(), caps, Box::new(record), state);
        let key = entry.key.as_ref().map(|k| k.value().clone());
        let id = self.registry.insert(entry)?;
        tracing::debug!(
            entity = caps.table(),
            entry = %id,
            key = ?key,
            state = state.as_str(),
            "Attached record"
        );
        Ok(id)
    }

    /// Track a new record for insertion on commit.
    #[tracing::instrument(level = "debug", skip(self, record))]
    pub fn add<T: Record>(&mut self, record: T) -> Result<EntryId> {
        let id = self.attach(record, EntryState::Added)?;
        tracing::info!(
            model = std::any::type_name::<T>(),
            table = T::entity_type().table,
            entry = %id,
            "Adding record to session"
        );
        Ok(id)
    }

    /// Mark `record` for update.
    ///
    /// A tracked record takes the scalar values of `record` and becomes
    /// `Modified` (an `Added` entry stays `Added`). An untracked record is
    /// attached as `Modified` with its own token as the original token.
    #[tracing::instrument(level = "debug", skip(self, record))]
    pub fn update<T: Record>(&mut self, record: &T) -> Result<EntryId> {
        self.ensure_open()?;
        let Some(id) = self.find_entry(record)? else {
            return self.attach(record.clone(), EntryState::Modified);
        };

        if let Some(entry) = self.registry.get_mut(id) {
            entry.record.apply(&record.to_owned_row())?;
            if entry.state != EntryState::Added {
                entry.state = EntryState::Modified;
            }
        }
        Ok(id)
    }

    /// Mark `record` for physical removal on commit.
    ///
    /// An `Added` entry is simply dropped. An untracked record is attached
    /// as `Deleted`.
    #[tracing::instrument(level = "debug", skip(self, record))]
    pub fn delete<T: Record>(&mut self, record: &T) -> Result<()> {
        self.ensure_open()?;
        let Some(id) = self.find_entry(record)? else {
            self.attach(record.clone(), EntryState::Deleted)?;
            return Ok(());
        };

        let added = self
            .registry
            .get(id)
            .is_some_and(|e| e.state == EntryState::Added);
        if added {
            self.registry.remove(id);
            tracing::debug!(entry = %id, "Dropped added record before insert");
        } else if let Some(entry) = self.registry.get_mut(id) {
            entry.state = EntryState::Deleted;
        }
        Ok(())
    }

    /// Soft-delete `record`: set its flag (and deletion timestamp) and mark
    /// the entry `Modified`, attaching it when untracked.
    ///
    /// Returns `false` without touching anything when `T` has no flag column.
    #[tracing::instrument(level = "debug", skip(self, record))]
    pub fn soft_delete<T: Record>(&mut self, record: &mut T) -> Result<bool> {
        self.ensure_open()?;
        let policy = self.soft_delete_policy::<T>()?;
        let Some(patch) = policy.mark(Utc::now()) else {
            tracing::debug!(
                table = T::entity_type().table,
                "Record type has no soft-delete flag; soft delete is a no-op"
            );
            return Ok(false);
        };

        let id = self.find_entry(record)?;
        record.apply_row(&patch)?;
        match id.and_then(|id| self.registry.get_mut(id)) {
            Some(entry) => {
                entry.record.apply(&patch)?;
                if entry.state != EntryState::Added {
                    entry.state = EntryState::Modified;
                }
            }
            None => {
                self.attach(record.clone(), EntryState::Modified)?;
            }
        }
        Ok(true)
    }

    /// Copy the scalar values of `source` onto the tracked `target`.
    ///
    /// The key, navigation state, and entry identity of `target` stay as
    /// they are. An `Unchanged` entry whose values now differ becomes
    /// `Modified`.
    pub fn apply_values<T: Record>(&mut self, target: &mut T, source: &T) -> Result<()> {
        let caps = self.capabilities::<T>()?;
        let Some(id) = self.find_entry(target)? else {
            return Err(Error::NotTracked {
                entity: caps.table(),
            });
        };

        let values: Row = source
            .to_row()
            .into_iter()
            .filter(|(column, _)| *column != caps.key_column)
            .collect();
        target.apply_row(&values)?;

        if let Some(entry) = self.registry.get_mut(id) {
            entry.record.apply(&values)?;
            if entry.state == EntryState::Unchanged && entry.has_changes() {
                entry.state = EntryState::Modified;
            }
        }
        Ok(())
    }

    /// Overwrite the original concurrency token of the entry of `record`.
    ///
    /// `Ok(false)` when `T` has no token; `NotTracked` when `record` is not
    /// tracked.
    pub fn set_original_token<T: Record>(
        &mut self,
        record: &T,
        token: Option<Vec<u8>>,
    ) -> Result<bool> {
        let caps = self.capabilities::<T>()?;
        let Some(resolver) = ConcurrencyToken::resolve(&caps) else {
            tracing::debug!(table = caps.table(), "Record type has no concurrency token");
            return Ok(false);
        };
        let entry = self
            .find_entry(record)?
            .and_then(|id| self.registry.get_mut(id))
            .ok_or(Error::NotTracked {
                entity: caps.table(),
            })?;
        resolver.set_original(entry, token);
        Ok(true)
    }

    /// Null the current and original concurrency token of `record`.
    ///
    /// `Ok(false)` when `T` has no token; `NotTracked` when `record` is not
    /// tracked.
    pub fn clear_token<T: Record>(&mut self, record: &mut T) -> Result<bool> {
        let caps = self.capabilities::<T>()?;
        let Some(resolver) = ConcurrencyToken::resolve(&caps) else {
            tracing::debug!(table = caps.table(), "Record type has no concurrency token");
            return Ok(false);
        };
        let entry = self
            .find_entry(record)?
            .and_then(|id| self.registry.get_mut(id))
            .ok_or(Error::NotTracked {
                entity: caps.table(),
            })?;
        resolver.clear(entry)?;
        record.apply_row(&resolver.patch(None))?;
        Ok(true)
    }

    // ========================================================================
    // Detach
    // ========================================================================

    /// Stop tracking `record`. Returns whether it was tracked.
    #[tracing::instrument(level = "debug", skip(self, record))]
    pub fn detach<T: Record>(&mut self, record: &T) -> Result<bool> {
        let Some(id) = self.find_entry(record)? else {
            return Ok(false);
        };
        Ok(self.registry.remove(id).is_some())
    }

    /// Stop tracking every `T` matching `predicate`. Returns how many.
    pub fn detach_where<T: Record>(&mut self, predicate: impl Fn(&T) -> bool) -> usize {
        let matching: Vec<EntryId> = self
            .registry
            .ids_of(TypeId::of::<T>())
            .into_iter()
            .filter(|id| {
                self.registry
                    .get(*id)
                    .and_then(TrackedEntry::downcast::<T>)
                    .is_some_and(&predicate)
            })
            .collect();
        for id in &matching {
            self.registry.remove(*id);
        }
        tracing::debug!(
            table = T::entity_type().table,
            detached = matching.len(),
            "Detached matching records"
        );
        matching.len()
    }

    // ========================================================================
    // Change Detection
    // ========================================================================

    /// Mark every `Unchanged` entry whose values differ from its snapshot
    /// as `Modified`. Returns how many changed state.
    pub fn detect_changes(&mut self) -> usize {
        let mut changed = 0;
        for (_, entry) in self.registry.iter_mut() {
            if entry.state == EntryState::Unchanged && entry.has_changes() {
                entry.state = EntryState::Modified;
                changed += 1;
            }
        }
        if changed > 0 {
            tracing::debug!(changed = changed, "Detected modified records");
        }
        changed
    }

    /// Throw away pending changes: added entries are dropped, every other
    /// entry gets its snapshot values back and becomes `Unchanged`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn discard_changes(&mut self) -> Result<usize> {
        let mut dropped = Vec::new();
        let mut reverted = 0;
        for (id, entry) in self.registry.iter_mut() {
            match entry.state {
                EntryState::Added => dropped.push(id),
                EntryState::Modified | EntryState::Deleted => {
                    entry.revert()?;
                    reverted += 1;
                }
                EntryState::Unchanged if entry.has_changes() => {
                    entry.revert()?;
                    reverted += 1;
                }
                _ => {}
            }
        }
        for id in &dropped {
            self.registry.remove(*id);
        }
        tracing::info!(
            dropped = dropped.len(),
            reverted = reverted,
            "Discarded pending changes"
        );
        Ok(dropped.len() + reverted)
    }
}
