//! Query building and materialization, tracked or not.

use std::any::TypeId;

use repokit_core::{
    Cx, EntityKey, Error, Outcome, Record, Result, Row, Value, try_outcome, try_result,
};
use repokit_query::{Expr, Include, IncludePlan, SelectQuery, Store};

use crate::TrackingSession;
use crate::registry::{EntryState, TrackedEntry};
use crate::soft_delete::SoftDeletePolicy;

impl<S: Store> TrackingSession<S> {
    // ========================================================================
    // Query Building
    // ========================================================================

    /// Whether reads should hide soft-deleted rows.
    fn filter_active(&self, ignore_soft_delete: bool) -> bool {
        self.config.soft_delete_filter && !ignore_soft_delete
    }

    /// A query over every visible `T`.
    ///
    /// Carries the soft-delete visibility filter unless `ignore_soft_delete`
    /// is set or the filter is disabled in the configuration. Needs no key,
    /// so untracked reads work for any key shape.
    pub fn visible_query<T: Record>(&self, ignore_soft_delete: bool) -> SelectQuery {
        let filter = if self.filter_active(ignore_soft_delete) {
            SoftDeletePolicy::of(T::entity_type()).visibility_filter()
        } else {
            None
        };
        SelectQuery::new(T::entity_type()).filter_opt(filter)
    }

    /// Resolve include paths, applying the visibility filter of each hop's
    /// target type unless `ignore_soft_delete` is set.
    pub fn include_plans<T: Record>(
        &self,
        includes: &[Include<T>],
        ignore_soft_delete: bool,
    ) -> Result<Vec<IncludePlan>> {
        let filtered = self.filter_active(ignore_soft_delete);
        includes
            .iter()
            .map(|include| {
                let mut plan = include.plan()?;
                if filtered {
                    for step in &mut plan.steps {
                        step.filter = SoftDeletePolicy::of(step.navigation.target_entity())
                            .visibility_filter();
                    }
                }
                Ok(plan)
            })
            .collect()
    }

    /// Predicate matching the primary key of `T`.
    ///
    /// The key column is looked up from metadata on every call, so a type
    /// with zero or several key fields fails here with `UnsupportedKeyShape`.
    pub fn key_filter<T: Record>(&self, key: impl Into<Value>) -> Result<Expr> {
        let field = T::entity_type().single_key_field()?;
        Ok(Expr::col(field.column_name).eq(key))
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run `query` against the store.
    pub async fn fetch(&self, cx: &Cx, query: &SelectQuery) -> Outcome<Vec<Row>, Error> {
        let store = try_result!(self.store());
        tracing::debug!(query = %query, "Fetching rows");
        store.select(cx, query).await
    }

    /// Whether any row matches `query`.
    #[tracing::instrument(level = "debug", skip(self, cx, query))]
    pub async fn exists_where(&self, cx: &Cx, query: &SelectQuery) -> Outcome<bool, Error> {
        let store = try_result!(self.store());
        store.exists(cx, query).await
    }

    /// Run `query` and decode the rows without tracking them.
    pub async fn select_untracked<T: Record>(
        &self,
        cx: &Cx,
        query: &SelectQuery,
    ) -> Outcome<Vec<T>, Error> {
        let rows = try_outcome!(self.fetch(cx, query).await);
        Outcome::Ok(try_result!(decode_rows(&rows)))
    }

    /// Run `query` and track the results.
    ///
    /// See [`TrackingSession::materialize_tracked`] for identity resolution
    /// and `hide_removed`.
    pub async fn select_tracked<T: Record>(
        &mut self,
        cx: &Cx,
        query: &SelectQuery,
        hide_removed: bool,
    ) -> Outcome<Vec<T>, Error> {
        let rows = try_outcome!(self.fetch(cx, query).await);
        Outcome::Ok(try_result!(
            self.materialize_tracked(rows, hide_removed)
        ))
    }

    /// Turn rows into tracked records.
    ///
    /// A row whose key is already tracked yields the tracked value, not the
    /// row. With `hide_removed`, such a row is skipped entirely when its
    /// tracked copy is pending deletion, or soft-deleted while the global
    /// soft-delete filter is on. New rows are
    /// attached as `Unchanged`.
    pub fn materialize_tracked<T: Record>(
        &mut self,
        rows: Vec<Row>,
        hide_removed: bool,
    ) -> Result<Vec<T>> {
        let caps = self.capabilities::<T>()?;
        let policy = SoftDeletePolicy::new(caps.soft_delete);
        let type_id = TypeId::of::<T>();

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let key = EntityKey::from_type_id(type_id, caps.key_of(&row));
            if let Some(entry) = self.registry.find(&key).and_then(|id| self.registry.get(id)) {
                let removed = entry.state == EntryState::Deleted
                    || (self.config.soft_delete_filter
                        && policy.is_soft_deleted(&entry.record.row()));
                if hide_removed && removed {
                    continue;
                }
                if let Some(tracked) = entry.downcast::<T>() {
                    records.push(tracked.clone());
                }
                continue;
            }

            let record = T::from_row(&row)?;
            let entry = TrackedEntry::new(
                type_id,
                caps,
                Box::new(record.clone()),
                EntryState::Unchanged,
            );
            self.registry.insert(entry)?;
            records.push(record);
        }

        tracing::debug!(
            table = caps.table(),
            count = records.len(),
            "Materialized tracked records"
        );
        Ok(records)
    }
}

/// Decode rows into untracked records.
pub(crate) fn decode_rows<T: Record>(rows: &[Row]) -> Result<Vec<T>> {
    rows.iter().map(T::from_row).collect()
}
