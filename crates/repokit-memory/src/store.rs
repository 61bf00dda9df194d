//! `Store` handles over a `MemoryDatabase`.

// `impl Future` return types mirror the trait signatures.
#![allow(clippy::manual_async_fn)]

use std::future::Future;

use repokit_core::{Cx, Error, Outcome, Result, Row, StoreErrorKind, check_cancelled};
use repokit_query::{Change, SelectQuery, Store, StoreFactory};

use crate::database::MemoryDatabase;

/// One handle on a `MemoryDatabase`, owned by one session.
#[derive(Debug)]
pub struct MemoryStore {
    db: MemoryDatabase,
    released: bool,
}

impl MemoryStore {
    /// Open a handle on `db`.
    #[must_use]
    pub fn new(db: &MemoryDatabase) -> Self {
        db.handle_opened();
        Self {
            db: db.clone(),
            released: false,
        }
    }

    /// The database this handle reads and writes.
    #[must_use]
    pub fn database(&self) -> &MemoryDatabase {
        &self.db
    }

    /// Whether `release` was called.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    fn check_open(&self) -> Result<()> {
        if self.released {
            return Err(Error::store(StoreErrorKind::Io, "store handle was released"));
        }
        Ok(())
    }
}

fn into_outcome<T>(result: Result<T>) -> Outcome<T, Error> {
    match result {
        Ok(v) => Outcome::Ok(v),
        Err(e) => Outcome::Err(e),
    }
}

impl Store for MemoryStore {
    fn select(
        &self,
        cx: &Cx,
        query: &SelectQuery,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        async move {
            check_cancelled!(cx);
            into_outcome(self.check_open().and_then(|()| self.db.select(query)))
        }
    }

    fn exists(
        &self,
        cx: &Cx,
        query: &SelectQuery,
    ) -> impl Future<Output = Outcome<bool, Error>> + Send {
        async move {
            check_cancelled!(cx);
            into_outcome(self.check_open().and_then(|()| self.db.exists(query)))
        }
    }

    fn save(
        &self,
        cx: &Cx,
        changes: &[Change],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        async move {
            check_cancelled!(cx);
            into_outcome(self.check_open().and_then(|()| self.db.apply(changes)))
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.db.handle_released();
            tracing::debug!(open_handles = self.db.open_handles(), "Memory store handle released");
        }
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.release();
    }
}

impl StoreFactory for MemoryDatabase {
    type Store = MemoryStore;

    fn open(&self) -> Result<MemoryStore> {
        Ok(MemoryStore::new(self))
    }
}
