//! Pending writes handed to `Store::save`.

use std::fmt;

use repokit_core::{EntityType, Row, Value};

/// One write of a commit.
///
/// `expected_token` carries the entry's original concurrency token; the
/// store must reject the whole batch when the stored token differs. `None`
/// skips the check.
#[derive(Debug, Clone)]
pub enum Change {
    /// Insert a new row. Store-generated columns are filled by the store.
    Insert {
        /// Record type.
        entity: &'static EntityType,
        /// Scalar values.
        row: Row,
    },
    /// Overwrite an existing row.
    Update {
        /// Record type.
        entity: &'static EntityType,
        /// Primary key of the row.
        key: Value,
        /// New scalar values.
        row: Row,
        /// Token the row must still carry.
        expected_token: Option<Vec<u8>>,
    },
    /// Physically remove a row.
    Delete {
        /// Record type.
        entity: &'static EntityType,
        /// Primary key of the row.
        key: Value,
        /// Token the row must still carry.
        expected_token: Option<Vec<u8>>,
    },
}

impl Change {
    /// Record type the change targets.
    #[must_use]
    pub fn entity(&self) -> &'static EntityType {
        match self {
            Change::Insert { entity, .. }
            | Change::Update { entity, .. }
            | Change::Delete { entity, .. } => entity,
        }
    }

    /// Short label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Change::Insert { .. } => "insert",
            Change::Update { .. } => "update",
            Change::Delete { .. } => "delete",
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Insert { entity, row } => {
                write!(f, "INSERT INTO \"{}\" ({} columns)", entity.table, row.len())
            }
            Change::Update { entity, key, .. } => {
                write!(f, "UPDATE \"{}\" WHERE key = {key}", entity.table)
            }
            Change::Delete { entity, key, .. } => {
                write!(f, "DELETE FROM \"{}\" WHERE key = {key}", entity.table)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repokit_core::FieldInfo;

    static FIELDS: &[FieldInfo] = &[FieldInfo::new("id", "id").primary_key(true)];
    static NOTES: EntityType = EntityType::new("Note", "notes", FIELDS, &[]);

    #[test]
    fn test_change_labels() {
        let delete = Change::Delete {
            entity: &NOTES,
            key: Value::BigInt(7),
            expected_token: None,
        };
        assert_eq!(delete.kind(), "delete");
        assert_eq!(delete.entity().table, "notes");
        assert_eq!(delete.to_string(), "DELETE FROM \"notes\" WHERE key = 7");
    }
}
