//! The generic repository.
//!
//! `Repository<'_, T, S>` is a thin, typed façade over the unit of work's
//! tracking session. It owns no records: every call goes straight to the
//! session, which is borrowed mutably for as long as the repository lives.

use std::future::Future;
use std::marker::PhantomData;
use std::panic::Location;

use repokit_core::{
    Collection, Cx, EntityType, Error, Outcome, Record, Reference, Result, SoftDeleteSupport,
    Value, try_outcome, try_result,
};
use repokit_query::{Expr, Include, OrderBy, SelectQuery, Store};
use repokit_session::{EntryId, EntryMut, TrackingSession};

/// Per-type state memoized by the unit of work.
#[derive(Debug, Clone, Copy)]
pub struct RepositoryState {
    /// Metadata of the record type.
    pub entity: &'static EntityType,
    /// Soft-delete columns of the record type.
    pub soft_delete: SoftDeleteSupport,
}

impl RepositoryState {
    pub(crate) fn of<T: Record>() -> Self {
        let entity = T::entity_type();
        Self {
            entity,
            soft_delete: SoftDeleteSupport::of(entity),
        }
    }
}

/// Typed data access for one record type.
pub struct Repository<'a, T: Record, S: Store> {
    session: &'a mut TrackingSession<S>,
    state: RepositoryState,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Record, S: Store> Repository<'a, T, S> {
    pub(crate) fn new(session: &'a mut TrackingSession<S>, state: RepositoryState) -> Self {
        Self {
            session,
            state,
            _marker: PhantomData,
        }
    }

    /// Metadata of `T`.
    pub fn entity(&self) -> &'static EntityType {
        self.state.entity
    }

    /// Query over every visible `T` plus the given include paths.
    fn query(&self, ignore_soft_delete: bool, includes: &[Include<T>]) -> Result<SelectQuery> {
        let mut query = self.session.visible_query::<T>(ignore_soft_delete);
        for plan in self.session.include_plans(includes, ignore_soft_delete)? {
            query = query.include(plan);
        }
        Ok(query)
    }

    /// Query for the row with primary key `key`.
    fn by_key(
        &self,
        key: impl Into<Value>,
        ignore_soft_delete: bool,
        includes: &[Include<T>],
    ) -> Result<SelectQuery> {
        let filter = self.session.key_filter::<T>(key)?;
        Ok(self
            .query(ignore_soft_delete, includes)?
            .filter(filter)
            .limit(1))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Every visible record, tracked.
    ///
    /// Records whose key is already tracked come back as the tracked value.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(table = self.state.entity.table))]
    pub async fn get_all(&mut self, cx: &Cx) -> Outcome<Vec<T>, Error> {
        let query = try_result!(self.query(false, &[]));
        self.session.select_tracked(cx, &query, false).await
    }

    /// Every visible record with `includes` loaded, untracked.
    #[tracing::instrument(level = "debug", skip(self, cx, includes), fields(table = self.state.entity.table))]
    pub async fn get_all_no_tracking(
        &mut self,
        cx: &Cx,
        includes: &[Include<T>],
    ) -> Outcome<Vec<T>, Error> {
        let query = try_result!(self.query(false, includes));
        self.session.select_untracked(cx, &query).await
    }

    /// Like [`Repository::get_all_no_tracking`], ordered by `order_key`.
    ///
    /// Rows with equal keys keep storage order.
    pub async fn get_all_no_tracking_ordered(
        &mut self,
        cx: &Cx,
        order_key: &str,
        descending: bool,
        includes: &[Include<T>],
    ) -> Outcome<Vec<T>, Error> {
        let order = if descending {
            OrderBy::desc(order_key)
        } else {
            OrderBy::asc(order_key)
        };
        let query = try_result!(self.query(false, includes)).order_by(order);
        self.session.select_untracked(cx, &query).await
    }

    /// Records matching `predicate`, untracked.
    ///
    /// With `ignore_soft_delete_filter` soft-deleted records are included;
    /// pass `true` unless they must be hidden.
    pub async fn get_all_with_filter(
        &mut self,
        cx: &Cx,
        predicate: Expr,
        ignore_soft_delete_filter: bool,
    ) -> Outcome<Vec<T>, Error> {
        let query = try_result!(self.query(ignore_soft_delete_filter, &[])).filter(predicate);
        self.session.select_untracked(cx, &query).await
    }

    /// Visible records matching `predicate` with `includes` loaded,
    /// untracked.
    pub async fn get_all_with_includes(
        &mut self,
        cx: &Cx,
        predicate: Expr,
        includes: &[Include<T>],
    ) -> Outcome<Vec<T>, Error> {
        let query = try_result!(self.query(false, includes)).filter(predicate);
        self.session.select_untracked(cx, &query).await
    }

    /// The visible record with primary key `key`, tracked.
    ///
    /// `None` when absent, soft-deleted, or tracked as deleted.
    #[tracing::instrument(level = "debug", skip(self, cx, key), fields(table = self.state.entity.table))]
    pub async fn get_by_id(&mut self, cx: &Cx, key: impl Into<Value>) -> Outcome<Option<T>, Error> {
        let query = try_result!(self.by_key(key, false, &[]));
        let records = try_outcome!(self.session.select_tracked(cx, &query, true).await);
        Outcome::Ok(records.into_iter().next())
    }

    /// The visible record with primary key `key`, untracked.
    ///
    /// The key column is looked up from metadata on every call; types with
    /// zero or several key fields fail with `UnsupportedKeyShape`.
    pub async fn get_by_id_no_tracking(
        &mut self,
        cx: &Cx,
        key: impl Into<Value>,
    ) -> Outcome<Option<T>, Error> {
        let query = try_result!(self.by_key(key, false, &[]));
        let records = try_outcome!(self.session.select_untracked(cx, &query).await);
        Outcome::Ok(records.into_iter().next())
    }

    /// The record with primary key `key`, tracked, soft-deleted or not.
    pub async fn get_by_id_ignoring_soft_delete(
        &mut self,
        cx: &Cx,
        key: impl Into<Value>,
    ) -> Outcome<Option<T>, Error> {
        let query = try_result!(self.by_key(key, true, &[]));
        let records = try_outcome!(self.session.select_tracked(cx, &query, false).await);
        Outcome::Ok(records.into_iter().next())
    }

    /// The visible record with primary key `key` and `includes` loaded,
    /// untracked.
    pub async fn get_by_id_with_includes(
        &mut self,
        cx: &Cx,
        key: impl Into<Value>,
        includes: &[Include<T>],
    ) -> Outcome<Option<T>, Error> {
        let query = try_result!(self.by_key(key, false, includes));
        let records = try_outcome!(self.session.select_untracked(cx, &query).await);
        Outcome::Ok(records.into_iter().next())
    }

    /// The first visible record matching `filter`, untracked.
    pub async fn get_by_filter_no_tracking(
        &mut self,
        cx: &Cx,
        filter: Expr,
        includes: &[Include<T>],
    ) -> Outcome<Option<T>, Error> {
        let query = try_result!(self.query(false, includes))
            .filter(filter)
            .limit(1);
        let records = try_outcome!(self.session.select_untracked(cx, &query).await);
        Outcome::Ok(records.into_iter().next())
    }

    /// Whether any visible record matches `predicate`.
    pub async fn exists(&mut self, cx: &Cx, predicate: Expr) -> Outcome<bool, Error> {
        let query = try_result!(self.query(false, &[])).filter(predicate);
        self.session.exists_where(cx, &query).await
    }

    /// Whether any record matches `predicate`, soft-deleted or not.
    pub async fn exists_ignoring_soft_delete(
        &mut self,
        cx: &Cx,
        predicate: Expr,
    ) -> Outcome<bool, Error> {
        let query = try_result!(self.query(true, &[])).filter(predicate);
        self.session.exists_where(cx, &query).await
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Track `record` for insertion on commit.
    pub fn add(&mut self, record: T) -> Result<EntryId> {
        self.session.add(record)
    }

    /// Mark `record` for update on commit.
    pub fn update(&mut self, record: &T) -> Result<EntryId> {
        self.session.update(record)
    }

    /// Mark `record` for physical removal on commit.
    pub fn delete(&mut self, record: &T) -> Result<()> {
        self.session.delete(record)
    }

    /// Flag `record` as deleted without removing its row.
    ///
    /// Returns `false`, changing nothing, when `T` has no soft-delete flag;
    /// see [`Repository::soft_delete_support`].
    pub fn soft_delete(&mut self, record: &mut T) -> Result<bool> {
        self.session.soft_delete(record)
    }

    /// Soft-delete columns `T` declares.
    pub fn soft_delete_support(&self) -> SoftDeleteSupport {
        self.state.soft_delete
    }

    /// Copy the column values of `source` onto the tracked `target`.
    pub fn apply_values(&mut self, target: &mut T, source: &T) -> Result<()> {
        self.session.apply_values(target, source)
    }

    /// Replace the original row version the next commit checks against.
    ///
    /// `Ok(false)` when `T` has no row version.
    pub fn set_original_row_version(&mut self, record: &T, token: Option<Vec<u8>>) -> Result<bool> {
        self.session.set_original_token(record, token)
    }

    /// Null the current and original row version of `record`, so the next
    /// commit skips the concurrency check.
    ///
    /// `Ok(false)` when `T` has no row version.
    pub fn clear_row_version(&mut self, record: &mut T) -> Result<bool> {
        self.session.clear_token(record)
    }

    /// The tracked entry of `record`.
    pub fn get_entry(&mut self, record: &T) -> Result<Option<EntryMut<'_, T>>> {
        self.session.entry(record)
    }

    /// Whether a tracked `T` satisfies `predicate`.
    pub fn is_tracked_by_key(&self, predicate: impl Fn(&T) -> bool) -> bool {
        self.session.is_tracked_where(predicate)
    }

    /// Stop tracking `record`. Returns whether it was tracked.
    pub fn detach(&mut self, record: &T) -> Result<bool> {
        self.session.detach(record)
    }

    /// Stop tracking every `T` satisfying `predicate`. Returns how many.
    pub fn detach_where(&mut self, predicate: impl Fn(&T) -> bool) -> usize {
        self.session.detach_where(predicate)
    }

    // ========================================================================
    // Navigation Loading
    // ========================================================================

    /// Load a collection navigation of `record` unless already loaded.
    #[track_caller]
    pub fn load_collection<R: Record>(
        &mut self,
        cx: &Cx,
        record: &mut T,
        navigation: Collection<T, R>,
    ) -> impl Future<Output = Outcome<(), Error>> {
        let site = Location::caller();
        self.session.load_collection(cx, record, navigation, site)
    }

    /// Query a collection navigation of `record` afresh, untracked.
    #[track_caller]
    pub fn reload_collection<R: Record>(
        &mut self,
        cx: &Cx,
        record: &T,
        navigation: Collection<T, R>,
    ) -> impl Future<Output = Outcome<Vec<R>, Error>> {
        let site = Location::caller();
        self.session.reload_collection(cx, record, navigation, site)
    }

    /// Load a reference navigation of a tracked `record`; `false` when
    /// `record` is not tracked.
    #[track_caller]
    pub fn load_reference<R: Record>(
        &mut self,
        cx: &Cx,
        record: &mut T,
        navigation: Reference<T, R>,
    ) -> impl Future<Output = Outcome<bool, Error>> {
        let site = Location::caller();
        self.session.load_reference(cx, record, navigation, site)
    }

    /// Load a reference navigation, attaching an untracked `record` first.
    #[track_caller]
    pub fn load_reference_safe<R: Record>(
        &mut self,
        cx: &Cx,
        record: &mut T,
        navigation: Reference<T, R>,
    ) -> impl Future<Output = Outcome<bool, Error>> {
        let site = Location::caller();
        self.session.load_reference_safe(cx, record, navigation, site)
    }

    /// Re-read `record` from the store, discarding local edits.
    ///
    /// `None`, with the entry detached, when the row no longer exists.
    pub async fn reload_entity(&mut self, cx: &Cx, record: &mut T) -> Outcome<Option<T>, Error> {
        self.session.reload(cx, record).await
    }
}
