//! Materialized rows returned by a store.

use crate::error::Result;
use crate::record::Record;
use crate::relationship::{Related, RelatedMany};
use crate::value::{FromValue, Value};

/// Rows eagerly loaded for one navigation of a parent row.
#[derive(Debug, Clone, PartialEq)]
pub enum RelatedRows {
    /// A reference navigation: zero or one row.
    One(Option<Box<Row>>),
    /// A collection navigation.
    Many(Vec<Row>),
}

/// A single row: ordered column values plus any eagerly loaded related rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<(String, Value)>,
    related: Vec<(String, RelatedRows)>,
}

impl Row {
    /// Create an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from `(column, value)` pairs as produced by `Record::to_row`.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            related: Vec::new(),
        }
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of `column`, if present.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    /// Decode `column` into a field type. A missing column decodes as NULL.
    pub fn get_as<T: FromValue>(&self, column: &str) -> Result<T> {
        T::from_value(column, self.get(column).unwrap_or(&Value::Null))
    }

    /// Set `column`, replacing an existing value or appending a new column.
    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        if let Some(slot) = self.values.iter_mut().find(|(name, _)| *name == column) {
            slot.1 = value;
        } else {
            self.values.push((column, value));
        }
    }

    /// Iterate over `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Related rows loaded for `navigation`.
    #[must_use]
    pub fn related(&self, navigation: &str) -> Option<&RelatedRows> {
        self.related
            .iter()
            .find(|(name, _)| name == navigation)
            .map(|(_, r)| r)
    }

    /// Mutable access to related rows for `navigation`.
    pub fn related_mut(&mut self, navigation: &str) -> Option<&mut RelatedRows> {
        self.related
            .iter_mut()
            .find(|(name, _)| name == navigation)
            .map(|(_, r)| r)
    }

    /// Attach eagerly loaded rows for `navigation`, replacing earlier ones.
    pub fn set_related(&mut self, navigation: impl Into<String>, rows: RelatedRows) {
        let navigation = navigation.into();
        if let Some(slot) = self.related.iter_mut().find(|(name, _)| *name == navigation) {
            slot.1 = rows;
        } else {
            self.related.push((navigation, rows));
        }
    }

    /// Decode a reference navigation. Absent data yields an unloaded `Related`.
    pub fn related_one<R: Record>(&self, navigation: &str) -> Result<Related<R>> {
        match self.related(navigation) {
            Some(RelatedRows::One(Some(row))) => Ok(Related::loaded(Some(R::from_row(row)?))),
            Some(RelatedRows::One(None)) => Ok(Related::loaded(None)),
            Some(RelatedRows::Many(rows)) => match rows.first() {
                Some(row) => Ok(Related::loaded(Some(R::from_row(row)?))),
                None => Ok(Related::loaded(None)),
            },
            None => Ok(Related::unloaded()),
        }
    }

    /// Decode a collection navigation. Absent data yields an unloaded `RelatedMany`.
    pub fn related_many<R: Record>(&self, navigation: &str) -> Result<RelatedMany<R>> {
        match self.related(navigation) {
            Some(RelatedRows::Many(rows)) => {
                let items = rows.iter().map(R::from_row).collect::<Result<Vec<_>>>()?;
                Ok(RelatedMany::loaded(items))
            }
            Some(RelatedRows::One(row)) => {
                let items = row
                    .iter()
                    .map(|r| R::from_row(r))
                    .collect::<Result<Vec<_>>>()?;
                Ok(RelatedMany::loaded(items))
            }
            None => Ok(RelatedMany::unloaded()),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}
