//! Navigation metadata for repokit.
//!
//! Navigations are declared at compile time (via `#[derive(Record)]`) and
//! represented as static metadata on each record's `EntityType`. Stores use
//! the metadata to resolve eager-load paths; the session uses the typed
//! `Reference`/`Collection` descriptors to load navigations on demand
//! without runtime reflection.

use std::fmt;

use crate::entity::EntityType;
use crate::error::{Error, Result};
use crate::record::Record;

/// The shape of a navigation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NavigationKind {
    /// Single-valued: `Hero` has one `Team`.
    #[default]
    Reference,
    /// Multi-valued: one `Team` has many `Hero`s.
    Collection,
}

/// Metadata about a navigation between records.
///
/// Exactly one of `local_key` / `remote_key` describes the join:
///
/// - `local_key`: column on the owner holding the target's primary key
///   (e.g. `"team_id"` on `Hero` for `Hero.team`).
/// - `remote_key`: column on the target holding the owner's primary key
///   (e.g. `"team_id"` on `Hero` for `Team.heroes`).
#[derive(Debug, Clone, Copy)]
pub struct NavigationInfo {
    /// Name of the navigation field.
    pub name: &'static str,
    /// Kind of navigation.
    pub kind: NavigationKind,
    /// Metadata of the related record type.
    pub target: fn() -> &'static EntityType,
    /// Foreign key column on the owner.
    pub local_key: Option<&'static str>,
    /// Foreign key column on the target.
    pub remote_key: Option<&'static str>,
}

impl NavigationInfo {
    /// Create a new navigation with required fields.
    #[must_use]
    pub const fn new(
        name: &'static str,
        kind: NavigationKind,
        target: fn() -> &'static EntityType,
    ) -> Self {
        Self {
            name,
            kind,
            target,
            local_key: None,
            remote_key: None,
        }
    }

    /// Set the owner-side foreign key column.
    #[must_use]
    pub const fn local_key(mut self, key: &'static str) -> Self {
        self.local_key = Some(key);
        self
    }

    /// Set the target-side foreign key column.
    #[must_use]
    pub const fn remote_key(mut self, key: &'static str) -> Self {
        self.remote_key = Some(key);
        self
    }

    /// Metadata of the related type.
    #[must_use]
    pub fn target_entity(&self) -> &'static EntityType {
        (self.target)()
    }
}

/// A single-valued navigation slot on a record.
///
/// Distinguishes "not loaded" from "loaded, and there is no related record".
#[derive(Clone, PartialEq)]
pub struct Related<R> {
    value: Option<R>,
    loaded: bool,
}

impl<R> Related<R> {
    /// A slot that has not been loaded.
    #[must_use]
    pub const fn unloaded() -> Self {
        Self {
            value: None,
            loaded: false,
        }
    }

    /// A loaded slot.
    #[must_use]
    pub const fn loaded(value: Option<R>) -> Self {
        Self {
            value,
            loaded: true,
        }
    }

    /// Whether the navigation has been loaded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// The related record, if loaded and present.
    #[must_use]
    pub fn get(&self) -> Option<&R> {
        self.value.as_ref()
    }

    /// Replace the slot with a loaded value.
    pub fn set(&mut self, value: Option<R>) {
        self.value = value;
        self.loaded = true;
    }

    /// Forget the loaded value.
    pub fn reset(&mut self) {
        self.value = None;
        self.loaded = false;
    }
}

impl<R> Default for Related<R> {
    fn default() -> Self {
        Self::unloaded()
    }
}

impl<R: fmt::Debug> fmt::Debug for Related<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.loaded {
            f.debug_tuple("Related").field(&self.value).finish()
        } else {
            f.write_str("Related(<unloaded>)")
        }
    }
}

/// A collection navigation slot on a record.
#[derive(Clone, PartialEq)]
pub struct RelatedMany<R> {
    items: Vec<R>,
    loaded: bool,
}

impl<R> RelatedMany<R> {
    /// A collection that has not been loaded.
    #[must_use]
    pub const fn unloaded() -> Self {
        Self {
            items: Vec::new(),
            loaded: false,
        }
    }

    /// A loaded collection.
    #[must_use]
    pub const fn loaded(items: Vec<R>) -> Self {
        Self {
            items,
            loaded: true,
        }
    }

    /// Whether the collection has been loaded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// The loaded items (empty when unloaded).
    #[must_use]
    pub fn items(&self) -> &[R] {
        &self.items
    }

    /// Number of loaded items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if no items are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace the collection with loaded items.
    pub fn set(&mut self, items: Vec<R>) {
        self.items = items;
        self.loaded = true;
    }

    /// Forget the loaded items.
    pub fn reset(&mut self) {
        self.items.clear();
        self.loaded = false;
    }
}

impl<R> Default for RelatedMany<R> {
    fn default() -> Self {
        Self::unloaded()
    }
}

impl<R: fmt::Debug> fmt::Debug for RelatedMany<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.loaded {
            f.debug_tuple("RelatedMany").field(&self.items).finish()
        } else {
            f.write_str("RelatedMany(<unloaded>)")
        }
    }
}

/// Typed descriptor of a reference navigation `T -> R`.
pub struct Reference<T, R> {
    /// Navigation name, matching a `NavigationInfo` on `T`.
    pub name: &'static str,
    get: fn(&T) -> &Related<R>,
    get_mut: fn(&mut T) -> &mut Related<R>,
}

impl<T, R> Reference<T, R> {
    /// Create a descriptor from the navigation name and field accessors.
    #[must_use]
    pub const fn new(
        name: &'static str,
        get: fn(&T) -> &Related<R>,
        get_mut: fn(&mut T) -> &mut Related<R>,
    ) -> Self {
        Self { name, get, get_mut }
    }

    /// Borrow the slot on `record`.
    pub fn slot<'a>(&self, record: &'a T) -> &'a Related<R> {
        (self.get)(record)
    }

    /// Mutably borrow the slot on `record`.
    pub fn slot_mut<'a>(&self, record: &'a mut T) -> &'a mut Related<R> {
        (self.get_mut)(record)
    }
}

impl<T: Record, R> Reference<T, R> {
    /// Resolve the navigation metadata on `T`.
    pub fn info(&self) -> Result<&'static NavigationInfo> {
        T::entity_type().navigation(self.name, NavigationKind::Reference)
    }
}

impl<T, R> Clone for Reference<T, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, R> Copy for Reference<T, R> {}

impl<T, R> fmt::Debug for Reference<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference").field("name", &self.name).finish()
    }
}

/// Typed descriptor of a collection navigation `T -> [R]`.
pub struct Collection<T, R> {
    /// Navigation name, matching a `NavigationInfo` on `T`.
    pub name: &'static str,
    get: fn(&T) -> &RelatedMany<R>,
    get_mut: fn(&mut T) -> &mut RelatedMany<R>,
}

impl<T, R> Collection<T, R> {
    /// Create a descriptor from the navigation name and field accessors.
    #[must_use]
    pub const fn new(
        name: &'static str,
        get: fn(&T) -> &RelatedMany<R>,
        get_mut: fn(&mut T) -> &mut RelatedMany<R>,
    ) -> Self {
        Self { name, get, get_mut }
    }

    /// Borrow the slot on `record`.
    pub fn slot<'a>(&self, record: &'a T) -> &'a RelatedMany<R> {
        (self.get)(record)
    }

    /// Mutably borrow the slot on `record`.
    pub fn slot_mut<'a>(&self, record: &'a mut T) -> &'a mut RelatedMany<R> {
        (self.get_mut)(record)
    }
}

impl<T: Record, R> Collection<T, R> {
    /// Resolve the navigation metadata on `T`.
    pub fn info(&self) -> Result<&'static NavigationInfo> {
        T::entity_type().navigation(self.name, NavigationKind::Collection)
    }
}

impl<T, R> Clone for Collection<T, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, R> Copy for Collection<T, R> {}

impl<T, R> fmt::Debug for Collection<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .finish()
    }
}

impl EntityType {
    /// Find a navigation by name, checking its kind.
    pub fn navigation(&self, name: &str, kind: NavigationKind) -> Result<&'static NavigationInfo> {
        let navigations: &'static [NavigationInfo] = self.navigations;
        navigations
            .iter()
            .find(|n| n.name == name && n.kind == kind)
            .ok_or_else(|| Error::UnknownNavigation {
                entity: self.table,
                navigation: name.to_string(),
            })
    }
}
