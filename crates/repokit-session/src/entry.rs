//! Direct access to one tracked entry.

use std::marker::PhantomData;

use repokit_core::{Record, Result, Row};

use crate::concurrency::ConcurrencyToken;
use crate::registry::{EntryId, EntryState, Registry, TrackedEntry};

/// Mutable view of the tracked entry of a `T` record.
///
/// Once the entry is detached (through `set_state(EntryState::Detached)`),
/// the handle reports `Detached` and every accessor returns `None`.
pub struct EntryMut<'a, T> {
    registry: &'a mut Registry,
    id: EntryId,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Record> EntryMut<'a, T> {
    pub(crate) fn new(registry: &'a mut Registry, id: EntryId) -> Self {
        Self {
            registry,
            id,
            _marker: PhantomData,
        }
    }

    fn entry(&self) -> Option<&TrackedEntry> {
        self.registry.get(self.id)
    }

    fn entry_mut(&mut self) -> Option<&mut TrackedEntry> {
        self.registry.get_mut(self.id)
    }

    /// Session-local id of the entry.
    #[must_use]
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> EntryState {
        self.entry().map_or(EntryState::Detached, |e| e.state)
    }

    /// Force a state transition.
    ///
    /// `Unchanged` accepts the current values as the stored ones (snapshot
    /// and original token included). `Detached` stops tracking the record.
    pub fn set_state(&mut self, state: EntryState) {
        let id = self.id;
        match state {
            EntryState::Detached => {
                self.registry.remove(id);
            }
            EntryState::Unchanged => {
                if let Some(entry) = self.entry_mut() {
                    entry.accept();
                }
            }
            other => {
                if let Some(entry) = self.entry_mut() {
                    entry.state = other;
                }
            }
        }
        tracing::debug!(entry = %id, state = state.as_str(), "Entry state set");
    }

    /// The session-owned record.
    #[must_use]
    pub fn record(&self) -> Option<&T> {
        self.entry().and_then(TrackedEntry::downcast)
    }

    /// Mutable access to the session-owned record. Edits are picked up by
    /// change detection at commit.
    pub fn record_mut(&mut self) -> Option<&mut T> {
        self.entry_mut().and_then(TrackedEntry::downcast_mut)
    }

    /// Current scalar values.
    #[must_use]
    pub fn current_values(&self) -> Option<Row> {
        self.entry().map(|e| e.record.row())
    }

    /// Scalar values as last read from or written to storage.
    #[must_use]
    pub fn original_values(&self) -> Option<&Row> {
        self.entry().map(|e| &e.snapshot)
    }

    /// Whether the current values differ from the original ones.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.entry().is_some_and(TrackedEntry::has_changes)
    }

    fn token(&self) -> Option<ConcurrencyToken> {
        self.entry().and_then(|e| ConcurrencyToken::resolve(&e.caps))
    }

    /// Current concurrency token. `None` when the type has none or it is NULL.
    #[must_use]
    pub fn current_token(&self) -> Option<Vec<u8>> {
        let token = self.token()?;
        self.entry().and_then(|e| token.current(e))
    }

    /// Original concurrency token.
    #[must_use]
    pub fn original_token(&self) -> Option<&[u8]> {
        let token = self.token()?;
        self.entry().and_then(|e| token.original(e))
    }

    /// Overwrite the current token. `false` when the type has no token.
    pub fn set_current_token(&mut self, value: Option<Vec<u8>>) -> Result<bool> {
        let Some(token) = self.token() else {
            return Ok(false);
        };
        match self.entry_mut() {
            Some(entry) => {
                token.set_current(entry, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Overwrite the original token. `false` when the type has no token.
    pub fn set_original_token(&mut self, value: Option<Vec<u8>>) -> bool {
        let Some(token) = self.token() else {
            return false;
        };
        match self.entry_mut() {
            Some(entry) => {
                token.set_original(entry, value);
                true
            }
            None => false,
        }
    }
}
