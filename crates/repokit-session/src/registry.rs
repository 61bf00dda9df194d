//! The entry registry: at most one tracked entry per (record type, key).

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use repokit_core::{AnyRecord, EntityCapabilities, EntityKey, Error, Result, Row};
use serde::{Deserialize, Serialize};

// ============================================================================
// Entry Identity and State
// ============================================================================

/// Session-local handle of a tracked entry.
///
/// Stays valid while the entry is tracked; unlike the primary key it exists
/// before the store assigns a generated key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(u64);

impl EntryId {
    /// Raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State of a tracked entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryState {
    /// Matches storage as of the last read or commit.
    Unchanged,
    /// New record, inserted on commit.
    Added,
    /// Changed record, updated on commit.
    Modified,
    /// Physically removed on commit.
    Deleted,
    /// Not watched by the session.
    Detached,
}

impl EntryState {
    /// Whether commit has work to do for an entry in this state.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(
            self,
            EntryState::Added | EntryState::Modified | EntryState::Deleted
        )
    }

    /// Lowercase label for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntryState::Unchanged => "unchanged",
            EntryState::Added => "added",
            EntryState::Modified => "modified",
            EntryState::Deleted => "deleted",
            EntryState::Detached => "detached",
        }
    }
}

// ============================================================================
// Tracked Entry
// ============================================================================

/// One tracked record.
pub(crate) struct TrackedEntry {
    /// Concrete record type.
    pub(crate) type_id: TypeId,
    /// Capabilities of the record type.
    pub(crate) caps: EntityCapabilities,
    /// The session-owned copy (type-erased).
    pub(crate) record: Box<dyn AnyRecord>,
    /// Current state.
    pub(crate) state: EntryState,
    /// Registry key; `None` until a store-generated key is assigned.
    pub(crate) key: Option<EntityKey>,
    /// Token the stored row is expected to carry at commit.
    pub(crate) original_token: Option<Vec<u8>>,
    /// Scalar values as last read from or written to storage.
    pub(crate) snapshot: Row,
}

impl TrackedEntry {
    pub(crate) fn new(
        type_id: TypeId,
        caps: EntityCapabilities,
        record: Box<dyn AnyRecord>,
        state: EntryState,
    ) -> Self {
        let snapshot = record.row();
        let key = registry_key(type_id, &caps, &snapshot);
        let original_token = caps.token_of(&snapshot);
        Self {
            type_id,
            caps,
            record,
            state,
            key,
            original_token,
            snapshot,
        }
    }

    /// Borrow the record as its concrete type.
    pub(crate) fn downcast<T: 'static>(&self) -> Option<&T> {
        self.record.as_any().downcast_ref()
    }

    /// Mutably borrow the record as its concrete type.
    pub(crate) fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.record.as_any_mut().downcast_mut()
    }

    /// Whether the scalar values differ from the snapshot.
    pub(crate) fn has_changes(&self) -> bool {
        self.record.row() != self.snapshot
    }

    /// Treat the current values as the stored ones.
    pub(crate) fn accept(&mut self) {
        self.snapshot = self.record.row();
        self.original_token = self.caps.token_of(&self.snapshot);
        self.state = EntryState::Unchanged;
    }

    /// Put the snapshot values back onto the record.
    pub(crate) fn revert(&mut self) -> Result<()> {
        self.record.apply(&self.snapshot)?;
        self.original_token = self.caps.token_of(&self.snapshot);
        self.state = EntryState::Unchanged;
        Ok(())
    }
}

/// Registry key for a row, or `None` while a generated key is unset.
fn registry_key(type_id: TypeId, caps: &EntityCapabilities, row: &Row) -> Option<EntityKey> {
    let key = caps.key_of(row);
    if caps.key_generated && key.is_unset_key() {
        None
    } else {
        Some(EntityKey::from_type_id(type_id, key))
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Tracked entries in attach order, plus the key index.
#[derive(Default)]
pub(crate) struct Registry {
    entries: BTreeMap<EntryId, TrackedEntry>,
    by_key: HashMap<EntityKey, EntryId>,
    next_id: u64,
}

impl Registry {
    /// Register an entry, rejecting a key that is already tracked.
    pub(crate) fn insert(&mut self, entry: TrackedEntry) -> Result<EntryId> {
        if let Some(key) = &entry.key {
            if self.by_key.contains_key(key) {
                return Err(Error::IdentityConflict {
                    entity: entry.caps.table(),
                    key: key.value().clone(),
                });
            }
        }

        self.next_id += 1;
        let id = EntryId(self.next_id);
        if let Some(key) = &entry.key {
            self.by_key.insert(key.clone(), id);
        }
        self.entries.insert(id, entry);
        Ok(id)
    }

    pub(crate) fn get(&self, id: EntryId) -> Option<&TrackedEntry> {
        self.entries.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: EntryId) -> Option<&mut TrackedEntry> {
        self.entries.get_mut(&id)
    }

    /// Stop tracking an entry.
    pub(crate) fn remove(&mut self, id: EntryId) -> Option<TrackedEntry> {
        let entry = self.entries.remove(&id)?;
        if let Some(key) = &entry.key {
            self.by_key.remove(key);
        }
        Some(entry)
    }

    /// Entry tracked under `key`.
    pub(crate) fn find(&self, key: &EntityKey) -> Option<EntryId> {
        self.by_key.get(key).copied()
    }

    /// Entry tracking the record whose scalar values are `row`.
    ///
    /// Records with an assigned key are found through the key index. Added
    /// records still waiting for a generated key have no key to go by and
    /// are matched on their full scalar values instead.
    pub(crate) fn locate(
        &self,
        type_id: TypeId,
        caps: &EntityCapabilities,
        row: &Row,
    ) -> Option<EntryId> {
        match registry_key(type_id, caps, row) {
            Some(key) => self.find(&key),
            None => self
                .entries
                .iter()
                .find(|(_, e)| e.type_id == type_id && e.key.is_none() && e.record.row() == *row)
                .map(|(id, _)| *id),
        }
    }

    /// Re-index an entry after its key was assigned or changed.
    pub(crate) fn rekey(&mut self, id: EntryId) -> Result<()> {
        let Some(entry) = self.entries.get(&id) else {
            return Ok(());
        };
        let new_key = registry_key(entry.type_id, &entry.caps, &entry.record.row());
        if new_key == entry.key {
            return Ok(());
        }

        if let Some(key) = &new_key {
            if let Some(other) = self.by_key.get(key) {
                if *other != id {
                    return Err(Error::IdentityConflict {
                        entity: entry.caps.table(),
                        key: key.value().clone(),
                    });
                }
            }
        }

        if let Some(old) = &entry.key {
            self.by_key.remove(old);
        }
        if let Some(key) = &new_key {
            self.by_key.insert(key.clone(), id);
        }
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.key = new_key;
        }
        Ok(())
    }

    /// Ids of every entry of a record type, in attach order.
    pub(crate) fn ids_of(&self, type_id: TypeId) -> Vec<EntryId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.type_id == type_id)
            .map(|(id, _)| *id)
            .collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (EntryId, &TrackedEntry)> {
        self.entries.iter().map(|(id, e)| (*id, e))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (EntryId, &mut TrackedEntry)> {
        self.entries.iter_mut().map(|(id, e)| (*id, e))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.by_key.clear();
    }
}
