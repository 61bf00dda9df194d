//! Change-tracking session for repokit.
//!
//! The `TrackingSession` is the stateful half of a unit of work. It owns a
//! store handle and a registry of tracked records, and turns pending record
//! states into one atomic change set on `save_changes`.
//!
//! # Design Philosophy
//!
//! - **One entry per identity**: the registry is keyed by (record type,
//!   primary key); attaching a tracked key again is an `IdentityConflict`.
//! - **Session-owned copies**: tracked records live in the registry as
//!   type-erased values; callers work on clones and hand changes back.
//! - **Capabilities, not reflection**: key, token and soft-delete columns are
//!   resolved once per type into a cached `EntityCapabilities`.
//! - **Atomic commit**: every pending entry goes to the store in a single
//!   `Store::save` call; entries change state only after it succeeds.
//!
//! # Example
//!
//! ```ignore
//! let mut session = TrackingSession::new(db.open()?);
//!
//! let query = session.visible_query::<Hero>(false);
//! let heroes: Vec<Hero> = session.select_tracked(&cx, &query, true).await?;
//!
//! let mut hero = heroes[0].clone();
//! hero.name = "Spider-Boy".into();
//! session.update(&hero)?;
//!
//! session.save_changes(&cx).await?;
//! ```

use repokit_core::{EntityCapabilities, Error, Record, Result};
use repokit_query::Store;
use serde::{Deserialize, Serialize};

pub mod concurrency;
pub mod entry;
pub mod model;
pub mod n1_detection;
mod navigation;
mod query;
mod registry;
mod save;
pub mod soft_delete;
mod tracking;

pub use concurrency::ConcurrencyToken;
pub use entry::EntryMut;
pub use model::ModelCache;
pub use n1_detection::{LoadSite, LoadStats, N1Detector};
pub use registry::{EntryId, EntryState};
pub use soft_delete::SoftDeletePolicy;

use registry::Registry;

// ============================================================================
// Session Configuration
// ============================================================================

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Compare tracked records against their snapshots before each commit
    /// and mark changed `Unchanged` entries `Modified`.
    pub auto_detect_changes: bool,
    /// Hide soft-deleted rows from reads unless a caller opts out.
    pub soft_delete_filter: bool,
    /// Warn once a navigation has been loaded on demand this many times.
    /// `None` disables detection.
    pub n1_detection_threshold: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_detect_changes: true,
            soft_delete_filter: true,
            n1_detection_threshold: Some(3),
        }
    }
}

impl SessionConfig {
    /// Toggle change detection at commit.
    #[must_use]
    pub fn auto_detect_changes(mut self, enabled: bool) -> Self {
        self.auto_detect_changes = enabled;
        self
    }

    /// Toggle the global soft-delete visibility filter.
    #[must_use]
    pub fn soft_delete_filter(mut self, enabled: bool) -> Self {
        self.soft_delete_filter = enabled;
        self
    }

    /// Set or disable the N+1 warning threshold.
    #[must_use]
    pub fn n1_detection_threshold(mut self, threshold: Option<usize>) -> Self {
        self.n1_detection_threshold = threshold;
        self
    }
}

// ============================================================================
// Session
// ============================================================================

/// A change-tracking session over one store handle.
///
/// Used by one logical operation at a time: every mutating method takes
/// `&mut self`.
pub struct TrackingSession<S: Store> {
    /// Store handle; `None` once released.
    store: Option<S>,
    /// Configuration.
    config: SessionConfig,
    /// Capabilities per record type.
    models: ModelCache,
    /// Tracked entries.
    registry: Registry,
    /// On-demand load counter, when enabled.
    n1: Option<N1Detector>,
}

impl<S: Store> TrackingSession<S> {
    /// Create a session with default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, SessionConfig::default())
    }

    /// Create a session with custom configuration.
    pub fn with_config(store: S, config: SessionConfig) -> Self {
        let n1 = config.n1_detection_threshold.map(N1Detector::new);
        Self {
            store: Some(store),
            config,
            models: ModelCache::new(),
            registry: Registry::default(),
            n1,
        }
    }

    /// Get the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The store handle, unless the session was released.
    pub fn store(&self) -> Result<&S> {
        self.store.as_ref().ok_or(Error::SessionReleased)
    }

    fn ensure_open(&self) -> Result<()> {
        self.store().map(|_| ())
    }

    /// Capabilities of `T`, resolved once and cached.
    pub fn capabilities<T: Record>(&mut self) -> Result<EntityCapabilities> {
        self.models.get_or_resolve::<T>()
    }

    /// Soft-delete policy of `T`.
    pub fn soft_delete_policy<T: Record>(&mut self) -> Result<SoftDeletePolicy> {
        Ok(SoftDeletePolicy::new(self.capabilities::<T>()?.soft_delete))
    }

    /// The N+1 detector, when enabled.
    pub fn n1_detector(&self) -> Option<&N1Detector> {
        self.n1.as_ref()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Whether `release` was called.
    pub fn is_released(&self) -> bool {
        self.store.is_none()
    }

    /// Release the store handle and forget every entry.
    ///
    /// Pending changes are discarded, never saved. Returns `false` if the
    /// session was already released.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn release(&mut self) -> bool {
        let Some(mut store) = self.store.take() else {
            return false;
        };

        let pending = self.pending_count();
        if pending > 0 {
            tracing::warn!(
                pending = pending,
                "Releasing session with uncommitted changes; they are discarded"
            );
        }

        self.registry.clear();
        store.release();
        tracing::info!("Tracking session released");
        true
    }

    // ========================================================================
    // Debug Diagnostics
    // ========================================================================

    /// Number of tracked entries.
    pub fn tracked_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of entries a commit would write, counting undetected edits
    /// when change detection is on.
    pub fn pending_count(&self) -> usize {
        let detect = self.config.auto_detect_changes;
        self.registry
            .iter()
            .filter(|(_, e)| {
                e.state.is_pending() || (detect && e.state == EntryState::Unchanged && e.has_changes())
            })
            .count()
    }

    /// Dump session state for debugging.
    pub fn debug_state(&self) -> SessionDebugInfo {
        let count = |state: EntryState| {
            self.registry
                .iter()
                .filter(|(_, e)| e.state == state)
                .count()
        };
        SessionDebugInfo {
            tracked: self.tracked_count(),
            unchanged: count(EntryState::Unchanged),
            added: count(EntryState::Added),
            modified: count(EntryState::Modified),
            deleted: count(EntryState::Deleted),
            released: self.is_released(),
        }
    }
}

/// Debug information about session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDebugInfo {
    /// Total tracked entries.
    pub tracked: usize,
    /// Entries in `Unchanged`.
    pub unchanged: usize,
    /// Entries pending INSERT.
    pub added: usize,
    /// Entries pending UPDATE.
    pub modified: usize,
    /// Entries pending DELETE.
    pub deleted: usize,
    /// Whether the session was released.
    pub released: bool,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert!(config.auto_detect_changes);
        assert!(config.soft_delete_filter);
        assert_eq!(config.n1_detection_threshold, Some(3));
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::default()
            .auto_detect_changes(false)
            .soft_delete_filter(false)
            .n1_detection_threshold(None);
        assert!(!config.auto_detect_changes);
        assert!(!config.soft_delete_filter);
        assert_eq!(config.n1_detection_threshold, None);
    }

    #[test]
    fn test_session_debug_info_serializes() {
        let info = SessionDebugInfo {
            tracked: 3,
            unchanged: 1,
            added: 1,
            modified: 1,
            deleted: 0,
            released: false,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["tracked"], 3);
        assert_eq!(json["released"], false);
    }
}
