//! The outbound store interface.
//!
//! A store executes queries and applies change sets; it knows nothing about
//! tracking. Every async method follows the same convention: it takes the
//! caller's `Cx`, must return `Outcome::Cancelled` without side effects when
//! the context is cancelled, and reports failures as `Error::Store` (or
//! `Error::ConcurrencyConflict` for a stale token) unmodified.

use std::future::Future;

use repokit_core::{Cx, Error, Outcome, Result, Row};

use crate::change::Change;
use crate::select::SelectQuery;

/// A handle on a transactional backing store.
pub trait Store: Send + Sync {
    /// Run a query, returning rows in query order with eager-loaded
    /// navigations attached via `Row::set_related`.
    fn select(
        &self,
        cx: &Cx,
        query: &SelectQuery,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Whether any row matches. Includes, order and limit are ignored.
    fn exists(
        &self,
        cx: &Cx,
        query: &SelectQuery,
    ) -> impl Future<Output = Outcome<bool, Error>> + Send;

    /// Apply a change set atomically.
    ///
    /// Returns one row per change, in order: the stored values after the
    /// write (generated key and fresh token included) for inserts and
    /// updates, an empty row for deletes. On any failure nothing is applied.
    fn save(
        &self,
        cx: &Cx,
        changes: &[Change],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Release the handle. Called exactly once by the owning session.
    fn release(&mut self) {}
}

/// Opens store handles, one per unit of work.
pub trait StoreFactory {
    /// Handle type.
    type Store: Store;

    /// Open a fresh handle.
    fn open(&self) -> Result<Self::Store>;
}
