//! Per-type capability cache.

use std::any::TypeId;
use std::collections::HashMap;

use repokit_core::{EntityCapabilities, Record, Result};

/// Capabilities resolved once per record type for the session's lifetime.
#[derive(Debug, Default)]
pub struct ModelCache {
    resolved: HashMap<TypeId, EntityCapabilities>,
}

impl ModelCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capabilities of `T`, resolving them on first use.
    ///
    /// Failures are not cached: an unsupported key shape fails every call.
    pub fn get_or_resolve<T: Record>(&mut self) -> Result<EntityCapabilities> {
        let type_id = TypeId::of::<T>();
        if let Some(caps) = self.resolved.get(&type_id) {
            return Ok(*caps);
        }
        let caps = EntityCapabilities::resolve(T::entity_type())?;
        self.resolved.insert(type_id, caps);
        Ok(caps)
    }

    /// Number of resolved types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    /// True if nothing was resolved yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}
