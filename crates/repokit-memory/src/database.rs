//! Shared in-memory tables.
//!
//! A `MemoryDatabase` is cheap to clone; every clone and every store handle
//! opened from it see the same tables. All reads and writes take one
//! `parking_lot::Mutex`, so a change set is applied atomically: it runs
//! against a copy of the tables that replaces the live ones only when every
//! change succeeded.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use repokit_core::{
    ConflictInfo, EntityCapabilities, EntityType, Error, KeyValue, NavigationKind, Record,
    RelatedRows, Result, Row, StoreErrorKind, Value,
};
use repokit_query::{Change, IncludeStep, SelectQuery};

use crate::eval;

// ============================================================================
// Tables
// ============================================================================

/// Rows of one table in storage (insertion) order.
#[derive(Debug, Clone, Default)]
struct Table {
    rows: Vec<Row>,
    /// Last key handed out for store-generated keys.
    last_id: i64,
}

impl Table {
    fn position(&self, key_column: &str, key: &Value) -> Option<usize> {
        let key = KeyValue(key.clone());
        self.rows.iter().position(|row| {
            row.get(key_column)
                .is_some_and(|v| KeyValue(v.clone()) == key)
        })
    }

    /// Hand out the next generated key, typed like the unset `template`.
    ///
    /// Fails without consuming a key when the next value does not fit the
    /// key's type.
    fn next_key(&mut self, template: &Value) -> Result<Value> {
        let next = self.last_id + 1;
        let key = match template {
            Value::Int(_) => Value::Int(i32::try_from(next).map_err(|_| {
                Error::store(
                    StoreErrorKind::Constraint,
                    format!("generated key {next} overflows an Int key"),
                )
            })?),
            _ => Value::BigInt(next),
        };
        self.last_id = next;
        Ok(key)
    }

    fn observe_key(&mut self, key: &Value) {
        if let Some(id) = key.as_i64() {
            self.last_id = self.last_id.max(id);
        }
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    tables: BTreeMap<&'static str, Table>,
    /// Source of concurrency tokens; every write takes the next value.
    token_counter: u64,
}

impl State {
    fn next_token(&mut self) -> Value {
        self.token_counter += 1;
        Value::Bytes(self.token_counter.to_be_bytes().to_vec())
    }

    fn rows(&self, table: &str) -> &[Row] {
        self.tables
            .get(table)
            .map_or(&[] as &[Row], |t| t.rows.as_slice())
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    open_handles: AtomicUsize,
}

// ============================================================================
// Database
// ============================================================================

/// An in-memory database shared by every handle opened from it.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl MemoryDatabase {
    /// Create an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store handles opened and not yet released.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.shared.open_handles.load(Ordering::SeqCst)
    }

    pub(crate) fn handle_opened(&self) {
        self.shared.open_handles.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn handle_released(&self) {
        self.shared.open_handles.fetch_sub(1, Ordering::SeqCst);
    }

    /// Insert `record` directly, bypassing any session.
    ///
    /// Applies the same rules as a committed insert (generated key, fresh
    /// token) and returns the stored row.
    pub fn seed<T: Record>(&self, record: &T) -> Result<Row> {
        let mut rows = self.apply(&[Change::Insert {
            entity: T::entity_type(),
            row: record.to_owned_row(),
        }])?;
        Ok(rows.pop().unwrap_or_default())
    }

    /// Stored rows of `table`, in storage order.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.shared.state.lock().rows(table).to_vec()
    }

    /// Every stored `T`, decoded.
    pub fn all<T: Record>(&self) -> Result<Vec<T>> {
        self.rows(T::entity_type().table)
            .iter()
            .map(T::from_row)
            .collect()
    }

    /// Number of rows in `table`.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.shared.state.lock().rows(table).len()
    }

    /// Full contents as JSON: `{table: [{column: value}]}`.
    ///
    /// Two snapshots are equal exactly when the stored data is.
    #[must_use]
    pub fn snapshot(&self) -> serde_json::Value {
        let state = self.shared.state.lock();
        let tables = state
            .tables
            .iter()
            .map(|(name, table)| {
                let rows = table
                    .rows
                    .iter()
                    .map(|row| {
                        let columns = row
                            .iter()
                            .map(|(column, value)| {
                                let json = serde_json::to_value(value)
                                    .unwrap_or(serde_json::Value::Null);
                                (column.to_string(), json)
                            })
                            .collect();
                        serde_json::Value::Object(columns)
                    })
                    .collect();
                ((*name).to_string(), serde_json::Value::Array(rows))
            })
            .collect();
        serde_json::Value::Object(tables)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Run `query`: filter, stable sort, limit, then eager-load includes.
    #[tracing::instrument(level = "debug", skip(self, query), fields(table = query.entity.table))]
    pub(crate) fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        for order in &query.order_by {
            if query.entity.field(&order.column).is_none() {
                return Err(Error::Custom(format!(
                    "unknown order column `{}` on `{}`",
                    order.column, query.entity.table
                )));
            }
        }
        let state = self.shared.state.lock();

        let mut rows = Vec::new();
        for row in state.rows(query.entity.table) {
            if eval::matches(query.filter.as_ref(), row)? {
                rows.push(row.clone());
            }
        }

        if !query.order_by.is_empty() {
            rows.sort_by(|a, b| {
                query
                    .order_by
                    .iter()
                    .map(|order| {
                        let left = a.get(&order.column).unwrap_or(&Value::Null);
                        let right = b.get(&order.column).unwrap_or(&Value::Null);
                        let ordering = eval::order(left, right);
                        if order.descending {
                            ordering.reverse()
                        } else {
                            ordering
                        }
                    })
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        for plan in &query.includes {
            load_steps(&state, &mut rows, query.entity, &plan.steps)?;
        }

        tracing::debug!(count = rows.len(), "Selected rows");
        Ok(rows)
    }

    /// Whether any row matches the query's filter.
    pub(crate) fn exists(&self, query: &SelectQuery) -> Result<bool> {
        let state = self.shared.state.lock();
        for row in state.rows(query.entity.table) {
            if eval::matches(query.filter.as_ref(), row)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Apply `changes` all-or-nothing, returning one row per change.
    #[tracing::instrument(level = "debug", skip(self, changes), fields(changes = changes.len()))]
    pub(crate) fn apply(&self, changes: &[Change]) -> Result<Vec<Row>> {
        let mut live = self.shared.state.lock();
        let mut work = live.clone();

        let mut results = Vec::with_capacity(changes.len());
        for change in changes {
            let row = apply_change(&mut work, change).inspect_err(|e| {
                tracing::debug!(change = %change, error = %e, "Change rejected; nothing applied");
            })?;
            results.push(row);
        }

        *live = work;
        Ok(results)
    }
}

fn apply_change(state: &mut State, change: &Change) -> Result<Row> {
    let caps = EntityCapabilities::resolve(change.entity())?;
    match change {
        Change::Insert { row, .. } => insert(state, &caps, row.clone()),
        Change::Update {
            key,
            row,
            expected_token,
            ..
        } => {
            let index = locate(state, &caps, key, expected_token.as_deref())?;
            let token = caps.concurrency_token.map(|_| state.next_token());
            let table = state.tables.entry(caps.table()).or_default();
            let stored = &mut table.rows[index];
            for (column, value) in row.iter() {
                stored.set(column, value.clone());
            }
            if let (Some(column), Some(token)) = (caps.concurrency_token, token) {
                stored.set(column, token);
            }
            Ok(stored.clone())
        }
        Change::Delete {
            key,
            expected_token,
            ..
        } => {
            let index = locate(state, &caps, key, expected_token.as_deref())?;
            state.tables.entry(caps.table()).or_default().rows.remove(index);
            Ok(Row::new())
        }
    }
}

fn insert(state: &mut State, caps: &EntityCapabilities, mut row: Row) -> Result<Row> {
    let token = caps.concurrency_token.map(|_| state.next_token());
    let table = state.tables.entry(caps.table()).or_default();

    let key = caps.key_of(&row);
    if caps.key_generated && key.is_unset_key() {
        row.set(caps.key_column, table.next_key(&key)?);
    } else if table.position(caps.key_column, &key).is_some() {
        return Err(Error::store(
            StoreErrorKind::Constraint,
            format!("duplicate key {key} in `{}`", caps.table()),
        ));
    } else {
        table.observe_key(&key);
    }

    if let (Some(column), Some(token)) = (caps.concurrency_token, token) {
        row.set(column, token);
    }
    table.rows.push(row.clone());
    Ok(row)
}

/// Index of the row with `key`, checking its token against `expected`.
///
/// A missing row or a token mismatch is a concurrency conflict. No
/// expected token skips the check.
fn locate(
    state: &State,
    caps: &EntityCapabilities,
    key: &Value,
    expected: Option<&[u8]>,
) -> Result<usize> {
    let conflict = || {
        Error::ConcurrencyConflict(ConflictInfo {
            entity: caps.table(),
            key: key.clone(),
        })
    };
    let table = state.tables.get(caps.table()).ok_or_else(conflict)?;
    let index = table.position(caps.key_column, key).ok_or_else(conflict)?;
    if let Some(expected) = expected {
        let current = caps.token_of(&table.rows[index]);
        if current.as_deref() != Some(expected) {
            return Err(conflict());
        }
    }
    Ok(index)
}

// ============================================================================
// Includes
// ============================================================================

/// Attach related rows for `steps` to each of `rows`, recursively.
///
/// A navigation already attached by an earlier include path is reused, so
/// paths sharing a prefix extend the same related rows.
fn load_steps(
    state: &State,
    rows: &mut [Row],
    owner: &'static EntityType,
    steps: &[IncludeStep],
) -> Result<()> {
    let Some((step, rest)) = steps.split_first() else {
        return Ok(());
    };
    let navigation = step.navigation;
    let target = navigation.target_entity();

    for row in rows.iter_mut() {
        if row.related(navigation.name).is_none() {
            let related = related_rows(state, row, owner, step)?;
            row.set_related(navigation.name, related);
        }
        if rest.is_empty() {
            continue;
        }
        match row.related_mut(navigation.name) {
            Some(RelatedRows::One(Some(related))) => {
                load_steps(state, std::slice::from_mut(related.as_mut()), target, rest)?;
            }
            Some(RelatedRows::Many(related)) => load_steps(state, related, target, rest)?,
            Some(RelatedRows::One(None)) | None => {}
        }
    }
    Ok(())
}

fn related_rows(
    state: &State,
    owner_row: &Row,
    owner: &'static EntityType,
    step: &IncludeStep,
) -> Result<RelatedRows> {
    let navigation = step.navigation;
    let target = navigation.target_entity();

    let (column, value) = match (navigation.local_key, navigation.remote_key) {
        (_, Some(remote)) => {
            let owner_key = owner.single_key_field()?.column_name;
            (remote, owner_row.get(owner_key).cloned().unwrap_or(Value::Null))
        }
        (Some(local), None) => (
            target.single_key_field()?.column_name,
            owner_row.get(local).cloned().unwrap_or(Value::Null),
        ),
        (None, None) => {
            return Err(Error::Custom(format!(
                "navigation `{}` on `{}` declares no join column",
                navigation.name, owner.table
            )));
        }
    };

    let mut matched = Vec::new();
    if !value.is_null() {
        let key = KeyValue(value);
        for row in state.rows(target.table) {
            let joined = row
                .get(column)
                .is_some_and(|v| KeyValue(v.clone()) == key);
            if joined && eval::matches(step.filter.as_ref(), row)? {
                matched.push(row.clone());
            }
        }
    }

    Ok(match navigation.kind {
        NavigationKind::Reference => RelatedRows::One(matched.into_iter().next().map(Box::new)),
        NavigationKind::Collection => RelatedRows::Many(matched),
    })
}
