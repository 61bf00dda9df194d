//! The `Record` trait implemented by every persisted type.

use std::any::Any;

use crate::entity::EntityType;
use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// A persisted record type.
///
/// Usually implemented with `#[derive(Record)]`. Navigation fields
/// (`Related`/`RelatedMany`) are not part of `to_row`; `from_row` reads them
/// from eagerly loaded related rows when present.
pub trait Record: Clone + Send + Sync + 'static {
    /// Static metadata for this type.
    fn entity_type() -> &'static EntityType;

    /// Scalar column values, in field order.
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Materialize a record, including any eagerly loaded navigations.
    fn from_row(row: &Row) -> Result<Self>;

    /// Overwrite the scalar fields present in `row`, leaving navigations and
    /// absent columns untouched.
    fn apply_row(&mut self, row: &Row) -> Result<()>;

    /// Primary-key values in key-column order.
    fn primary_key_value(&self) -> Vec<Value> {
        let entity = Self::entity_type();
        let row = self.to_row();
        entity
            .primary_key_columns()
            .map(|column| {
                row.iter()
                    .find(|(name, _)| *name == column)
                    .map_or(Value::Null, |(_, v)| v.clone())
            })
            .collect()
    }

    /// Scalar values as an owned `Row`.
    fn to_owned_row(&self) -> Row {
        Row::from_pairs(self.to_row())
    }
}

/// Object-safe view of a record, used by the session's type-erased registry.
pub trait AnyRecord: Send + Sync {
    /// Metadata of the concrete type.
    fn entity(&self) -> &'static EntityType;
    /// Scalar values as a row.
    fn row(&self) -> Row;
    /// Overwrite scalar fields from `row`.
    fn apply(&mut self, row: &Row) -> Result<()>;
    /// Downcast support.
    fn as_any(&self) -> &dyn Any;
    /// Mutable downcast support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Record> AnyRecord for T {
    fn entity(&self) -> &'static EntityType {
        <T as Record>::entity_type()
    }

    fn row(&self) -> Row {
        self.to_owned_row()
    }

    fn apply(&mut self, row: &Row) -> Result<()> {
        self.apply_row(row)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
