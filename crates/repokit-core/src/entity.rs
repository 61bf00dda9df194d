//! Per-type metadata and the capability descriptor resolved from it.

use crate::error::{Error, Result};
use crate::field::FieldInfo;
use crate::relationship::NavigationInfo;
use crate::row::Row;
use crate::value::Value;

/// Static metadata of a record type.
#[derive(Debug)]
pub struct EntityType {
    /// Rust type name, for diagnostics.
    pub name: &'static str,
    /// Table the type is stored in.
    pub table: &'static str,
    /// Scalar fields in column order.
    pub fields: &'static [FieldInfo],
    /// Navigations to other record types.
    pub navigations: &'static [NavigationInfo],
}

impl EntityType {
    /// Create entity metadata.
    #[must_use]
    pub const fn new(
        name: &'static str,
        table: &'static str,
        fields: &'static [FieldInfo],
        navigations: &'static [NavigationInfo],
    ) -> Self {
        Self {
            name,
            table,
            fields,
            navigations,
        }
    }

    /// Columns flagged as primary key.
    pub fn primary_key_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.column_name)
    }

    /// Field metadata for `column`.
    #[must_use]
    pub fn field(&self, column: &str) -> Option<&'static FieldInfo> {
        let fields: &'static [FieldInfo] = self.fields;
        fields.iter().find(|f| f.column_name == column)
    }

    /// The single primary-key field, or `UnsupportedKeyShape`.
    pub fn single_key_field(&self) -> Result<&'static FieldInfo> {
        let fields: &'static [FieldInfo] = self.fields;
        let mut keys = fields.iter().filter(|f| f.primary_key);
        match (keys.next(), keys.next()) {
            (Some(field), None) => Ok(field),
            _ => Err(Error::UnsupportedKeyShape {
                entity: self.table,
                key_fields: self.primary_key_columns().count(),
            }),
        }
    }
}

/// Which soft-delete columns a record type declares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftDeleteSupport {
    /// Boolean "deleted" column.
    pub flag_column: Option<&'static str>,
    /// Deletion timestamp column.
    pub timestamp_column: Option<&'static str>,
}

impl SoftDeleteSupport {
    /// Whether soft delete does anything for this type.
    ///
    /// Without a flag column, soft delete is a no-op even if a timestamp
    /// column exists.
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        self.flag_column.is_some()
    }

    /// Soft-delete columns declared by `entity`.
    #[must_use]
    pub fn of(entity: &EntityType) -> Self {
        let column = |pred: fn(&FieldInfo) -> bool| {
            let fields: &'static [FieldInfo] = entity.fields;
            fields.iter().find(|f| pred(f)).map(|f| f.column_name)
        };
        Self {
            flag_column: column(|f| f.soft_delete_flag),
            timestamp_column: column(|f| f.deletion_timestamp),
        }
    }
}

/// Capability descriptor of a record type, resolved once from its metadata.
///
/// Answers "which column is the key", "is there a concurrency token at
/// column X", and "are there soft-delete columns Y, Z" without inspecting
/// the type again.
#[derive(Debug, Clone, Copy)]
pub struct EntityCapabilities {
    /// The metadata this descriptor was resolved from.
    pub entity: &'static EntityType,
    /// The single primary-key column.
    pub key_column: &'static str,
    /// Whether the store assigns the key on insert.
    pub key_generated: bool,
    /// The concurrency-token column, if any.
    pub concurrency_token: Option<&'static str>,
    /// Soft-delete columns, if any.
    pub soft_delete: SoftDeleteSupport,
}

impl EntityCapabilities {
    /// Resolve capabilities from metadata.
    ///
    /// Fails with `UnsupportedKeyShape` unless exactly one key field exists;
    /// composite keys are never reduced to one of their columns.
    pub fn resolve(entity: &'static EntityType) -> Result<Self> {
        let key = entity.single_key_field()?;
        let token = entity
            .fields
            .iter()
            .find(|f| f.concurrency_token)
            .map(|f| f.column_name);

        let caps = Self {
            entity,
            key_column: key.column_name,
            key_generated: key.store_generated,
            concurrency_token: token,
            soft_delete: SoftDeleteSupport::of(entity),
        };

        tracing::debug!(
            entity = entity.table,
            key = caps.key_column,
            token = ?caps.concurrency_token,
            soft_delete = caps.soft_delete.is_supported(),
            "Resolved entity capabilities"
        );

        Ok(caps)
    }

    /// Table name shorthand.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        self.entity.table
    }

    /// Key value of a row (NULL when missing).
    #[must_use]
    pub fn key_of(&self, row: &Row) -> Value {
        row.get(self.key_column).cloned().unwrap_or(Value::Null)
    }

    /// Concurrency token of a row. `None` when the type has no token or the
    /// row carries NULL.
    #[must_use]
    pub fn token_of(&self, row: &Row) -> Option<Vec<u8>> {
        self.concurrency_token
            .and_then(|column| row.get(column))
            .and_then(Value::as_bytes)
            .map(<[u8]>::to_vec)
    }
}
