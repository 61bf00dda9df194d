//! The unit of work: one tracking session plus memoized repositories.

use std::any::TypeId;
use std::collections::HashMap;

use repokit_core::{Cx, Error, Outcome, Record, Result};
use repokit_query::Store;
use repokit_session::{SessionConfig, TrackingSession};

use crate::repository::{Repository, RepositoryState};

/// One logical operation's view of the store.
///
/// Owns exactly one [`TrackingSession`]. Create one per operation, commit
/// what it changed, and release it; a unit of work is never reused.
/// Dropping an unreleased unit releases it and discards pending changes.
pub struct UnitOfWork<S: Store> {
    session: TrackingSession<S>,
    repositories: HashMap<TypeId, RepositoryState>,
}

impl<S: Store> UnitOfWork<S> {
    /// Wrap a store handle with default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, SessionConfig::default())
    }

    /// Wrap a store handle with custom configuration.
    pub fn with_config(store: S, config: SessionConfig) -> Self {
        tracing::debug!(?config, "Unit of work started");
        Self {
            session: TrackingSession::with_config(store, config),
            repositories: HashMap::new(),
        }
    }

    /// The repository of `T`, created on first use.
    pub fn repository<T: Record>(&mut self) -> Repository<'_, T, S> {
        let state = *self
            .repositories
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                tracing::debug!(
                    model = std::any::type_name::<T>(),
                    table = T::entity_type().table,
                    "Creating repository"
                );
                RepositoryState::of::<T>()
            });
        Repository::new(&mut self.session, state)
    }

    /// Number of repositories created so far.
    pub fn repository_count(&self) -> usize {
        self.repositories.len()
    }

    /// The underlying session.
    pub fn session(&self) -> &TrackingSession<S> {
        &self.session
    }

    /// Mutable access to the underlying session.
    pub fn session_mut(&mut self) -> &mut TrackingSession<S> {
        &mut self.session
    }

    /// Write every pending change in one atomic store call.
    ///
    /// Returns the number of records written. A stale row version fails
    /// the whole commit with `ConcurrencyConflict`, leaving the store and
    /// every entry as they were.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn commit(&mut self, cx: &Cx) -> Outcome<usize, Error> {
        self.session.save_changes(cx).await
    }

    /// Discard pending changes without releasing. Returns how many entries
    /// were dropped or reverted.
    pub fn rollback(&mut self) -> Result<usize> {
        self.session.discard_changes()
    }

    /// Whether the unit of work was released.
    pub fn is_released(&self) -> bool {
        self.session.is_released()
    }

    /// Release the session and its store handle.
    ///
    /// Returns `false` if already released.
    pub fn release(&mut self) -> bool {
        self.repositories.clear();
        self.session.release()
    }
}

impl<S: Store> Drop for UnitOfWork<S> {
    fn drop(&mut self) {
        if !self.session.is_released() {
            tracing::debug!("Unit of work dropped without release; releasing");
            self.release();
        }
    }
}
