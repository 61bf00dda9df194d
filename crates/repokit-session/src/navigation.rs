//! On-demand navigation loading and entity reload.

use std::panic::Location;

use repokit_core::{
    Collection, Cx, EntityCapabilities, Error, NavigationInfo, Outcome, Record, Reference,
    Result, Row, Value, try_outcome, try_result,
};
use repokit_query::{Expr, SelectQuery, Store};

use crate::TrackingSession;
use crate::query::decode_rows;
use crate::registry::{EntryId, EntryState};

impl<S: Store> TrackingSession<S> {
    /// Query for the targets of `navigation` from the owner row `owner`.
    ///
    /// `None` when the owner's foreign key is NULL: there is nothing to load.
    fn navigation_query<R: Record>(
        &mut self,
        navigation: &NavigationInfo,
        owner_caps: &EntityCapabilities,
        owner: &Row,
    ) -> Result<Option<SelectQuery>> {
        let query = self.visible_query::<R>(false);
        let filter = match (navigation.local_key, navigation.remote_key) {
            (_, Some(remote)) => Expr::col(remote).eq(owner_caps.key_of(owner)),
            (Some(local), None) => {
                let value = owner.get(local).cloned().unwrap_or(Value::Null);
                if value.is_null() {
                    return Ok(None);
                }
                let target = self.capabilities::<R>()?;
                Expr::col(target.key_column).eq(value)
            }
            (None, None) => {
                return Err(Error::Custom(format!(
                    "navigation `{}` on `{}` declares no join column",
                    navigation.name,
                    owner_caps.table()
                )));
            }
        };
        Ok(Some(query.filter(filter)))
    }

    fn record_load(
        &mut self,
        owner: &'static str,
        navigation: &'static str,
        site: &'static Location<'static>,
    ) {
        if let Some(detector) = self.n1.as_mut() {
            detector.record_load(owner, navigation, site);
        }
    }

    /// Materialize related rows: tracked when the owner is tracked.
    fn materialize_related<R: Record>(
        &mut self,
        rows: Vec<Row>,
        tracked: bool,
    ) -> Result<Vec<R>> {
        if tracked {
            self.materialize_tracked(rows, true)
        } else {
            decode_rows(&rows)
        }
    }

    /// Mirror a loaded navigation onto the session-owned copy of the owner.
    fn update_tracked_owner<T: Record>(
        &mut self,
        owner: Option<EntryId>,
        apply: impl FnOnce(&mut T),
    ) {
        if let Some(tracked) = owner
            .and_then(|id| self.registry.get_mut(id))
            .and_then(|entry| entry.downcast_mut::<T>())
        {
            apply(tracked);
        }
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// Populate a collection navigation of `record` unless already loaded.
    ///
    /// Related records are tracked when `record` is.
    #[tracing::instrument(level = "debug", skip(self, cx, record, site))]
    pub async fn load_collection<T: Record, R: Record>(
        &mut self,
        cx: &Cx,
        record: &mut T,
        navigation: Collection<T, R>,
        site: &'static Location<'static>,
    ) -> Outcome<(), Error> {
        if navigation.slot(record).is_loaded() {
            tracing::debug!(navigation = navigation.name, "Collection already loaded");
            return Outcome::Ok(());
        }

        let info = try_result!(navigation.info());
        let owner_caps = try_result!(self.capabilities::<T>());
        let owner = try_result!(self.find_entry(record));
        let owner_row = record.to_owned_row();
        let query = try_result!(self.navigation_query::<R>(info, &owner_caps, &owner_row));

        let items: Vec<R> = match query {
            Some(query) => {
                let rows = try_outcome!(self.fetch(cx, &query).await);
                self.record_load(owner_caps.table(), info.name, site);
                try_result!(self.materialize_related(rows, owner.is_some()))
            }
            None => Vec::new(),
        };

        tracing::debug!(
            table = owner_caps.table(),
            navigation = info.name,
            count = items.len(),
            "Loaded collection"
        );
        self.update_tracked_owner::<T>(owner, |tracked| {
            navigation.slot_mut(tracked).set(items.clone());
        });
        navigation.slot_mut(record).set(items);
        Outcome::Ok(())
    }

    /// Query a collection navigation afresh, untracked, leaving `record` and
    /// the session untouched.
    #[tracing::instrument(level = "debug", skip(self, cx, record, site))]
    pub async fn reload_collection<T: Record, R: Record>(
        &mut self,
        cx: &Cx,
        record: &T,
        navigation: Collection<T, R>,
        site: &'static Location<'static>,
    ) -> Outcome<Vec<R>, Error> {
        let info = try_result!(navigation.info());
        let owner_caps = try_result!(self.capabilities::<T>());
        let owner_row = record.to_owned_row();
        let query = try_result!(self.navigation_query::<R>(info, &owner_caps, &owner_row));
        let Some(query) = query else {
            return Outcome::Ok(Vec::new());
        };
        let rows = try_outcome!(self.fetch(cx, &query).await);
        self.record_load(owner_caps.table(), info.name, site);
        Outcome::Ok(try_result!(decode_rows(&rows)))
    }

    // ========================================================================
    // References
    // ========================================================================

    /// Populate a reference navigation of a tracked `record`.
    ///
    /// Returns `false`, without querying, when `record` is not tracked.
    #[tracing::instrument(level = "debug", skip(self, cx, record, site))]
    pub async fn load_reference<T: Record, R: Record>(
        &mut self,
        cx: &Cx,
        record: &mut T,
        navigation: Reference<T, R>,
        site: &'static Location<'static>,
    ) -> Outcome<bool, Error> {
        let Some(owner) = try_result!(self.find_entry(record)) else {
            tracing::debug!(
                navigation = navigation.name,
                "Record is not tracked; reference not loaded"
            );
            return Outcome::Ok(false);
        };
        if navigation.slot(record).is_loaded() {
            return Outcome::Ok(true);
        }

        let info = try_result!(navigation.info());
        let owner_caps = try_result!(self.capabilities::<T>());
        let owner_row = record.to_owned_row();
        let query = try_result!(self.navigation_query::<R>(info, &owner_caps, &owner_row));

        let related: Option<R> = match query {
            Some(query) => {
                let rows = try_outcome!(self.fetch(cx, &query.limit(1)).await);
                self.record_load(owner_caps.table(), info.name, site);
                try_result!(self.materialize_related::<R>(rows, true))
                    .into_iter()
                    .next()
            }
            None => None,
        };

        self.update_tracked_owner::<T>(Some(owner), |tracked| {
            navigation.slot_mut(tracked).set(related.clone());
        });
        navigation.slot_mut(record).set(related);
        Outcome::Ok(true)
    }

    /// Like `load_reference`, attaching `record` as `Unchanged` first when
    /// it is not tracked. Its field values are kept as they are.
    ///
    /// Fails with `IdentityConflict` when its key is tracked with different
    /// values, i.e. by another instance.
    pub async fn load_reference_safe<T: Record, R: Record>(
        &mut self,
        cx: &Cx,
        record: &mut T,
        navigation: Reference<T, R>,
        site: &'static Location<'static>,
    ) -> Outcome<bool, Error> {
        let caps = try_result!(self.capabilities::<T>());
        let row = record.to_owned_row();
        match try_result!(self.find_entry(record)) {
            Some(id) => {
                let same = self.registry.get(id).is_some_and(|e| e.record.row() == row);
                if !same {
                    return Outcome::Err(Error::IdentityConflict {
                        entity: caps.table(),
                        key: caps.key_of(&row),
                    });
                }
            }
            None => {
                try_result!(self.attach(record.clone(), EntryState::Unchanged));
            }
        }
        self.load_reference(cx, record, navigation, site).await
    }

    // ========================================================================
    // Reload
    // ========================================================================

    /// Re-read `record` by key, ignoring the soft-delete filter.
    ///
    /// The stored values overwrite `record` and its tracked copy, which
    /// becomes `Unchanged` (an untracked record is attached). When the row
    /// is gone the entry is detached and `None` is returned.
    #[tracing::instrument(level = "debug", skip(self, cx, record))]
    pub async fn reload<T: Record>(
        &mut self,
        cx: &Cx,
        record: &mut T,
    ) -> Outcome<Option<T>, Error> {
        let caps = try_result!(self.capabilities::<T>());
        let key = caps.key_of(&record.to_owned_row());
        let owner = try_result!(self.find_entry(record));

        let query = SelectQuery::new(T::entity_type())
            .filter(Expr::col(caps.key_column).eq(key.clone()))
            .limit(1);
        let rows = try_outcome!(self.fetch(cx, &query).await);

        let Some(row) = rows.into_iter().next() else {
            if let Some(id) = owner {
                self.registry.remove(id);
            }
            tracing::info!(
                table = caps.table(),
                key = %key,
                "Reloaded record no longer exists"
            );
            return Outcome::Ok(None);
        };

        try_result!(record.apply_row(&row));
        match owner.and_then(|id| self.registry.get_mut(id)) {
            Some(entry) => {
                try_result!(entry.record.apply(&row));
                entry.accept();
            }
            None => {
                try_result!(self.attach(record.clone(), EntryState::Unchanged));
            }
        }
        Outcome::Ok(Some(record.clone()))
    }
}
