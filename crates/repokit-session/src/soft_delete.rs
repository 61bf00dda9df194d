//! Soft-delete policy.
//!
//! Soft deletion flips a record's deleted flag (and stamps its deletion
//! timestamp when the type has one) instead of removing the row. Reads hide
//! flagged rows through a visibility filter unless a caller opts out.
//!
//! Types without a flag column get no filter, and marking them is a no-op
//! reported through `SoftDeletePolicy::is_supported`.

use chrono::{DateTime, Utc};
use repokit_core::{EntityType, Row, SoftDeleteSupport, Value};
use repokit_query::Expr;

/// Soft-delete behaviour of one record type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftDeletePolicy {
    support: SoftDeleteSupport,
}

impl SoftDeletePolicy {
    /// Policy for the given soft-delete columns.
    #[must_use]
    pub const fn new(support: SoftDeleteSupport) -> Self {
        Self { support }
    }

    /// Policy read straight from entity metadata.
    #[must_use]
    pub fn of(entity: &EntityType) -> Self {
        Self::new(SoftDeleteSupport::of(entity))
    }

    /// The columns this policy works with.
    #[must_use]
    pub const fn support(&self) -> SoftDeleteSupport {
        self.support
    }

    /// Whether soft delete does anything for this type.
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        self.support.is_supported()
    }

    /// Predicate that keeps rows not soft-deleted.
    ///
    /// A NULL flag counts as not deleted.
    #[must_use]
    pub fn visibility_filter(&self) -> Option<Expr> {
        self.support.flag_column.map(|flag| {
            Expr::col(flag)
                .is_null()
                .or(Expr::col(flag).eq(false))
        })
    }

    /// Column values that mark a record soft-deleted at `now`.
    ///
    /// `None` when the type has no flag column.
    #[must_use]
    pub fn mark(&self, now: DateTime<Utc>) -> Option<Row> {
        let flag = self.support.flag_column?;
        let mut row = Row::from_pairs([(flag, Value::Bool(true))]);
        if let Some(stamp) = self.support.timestamp_column {
            row.set(stamp, Value::Timestamp(now));
        }
        Some(row)
    }

    /// Whether `row` is flagged as soft-deleted.
    #[must_use]
    pub fn is_soft_deleted(&self, row: &Row) -> bool {
        self.support
            .flag_column
            .and_then(|flag| row.get(flag))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repokit_core::FieldInfo;

    static FLAGGED_FIELDS: &[FieldInfo] = &[
        FieldInfo::new("id", "id").primary_key(true),
        FieldInfo::new("deleted", "deleted").soft_delete_flag(true),
        FieldInfo::new("deleted_at", "deleted_at").deletion_timestamp(true),
    ];
    static FLAGGED: EntityType = EntityType::new("Flagged", "flagged", FLAGGED_FIELDS, &[]);

    static STAMP_ONLY_FIELDS: &[FieldInfo] = &[
        FieldInfo::new("id", "id").primary_key(true),
        FieldInfo::new("deleted_at", "deleted_at").deletion_timestamp(true),
    ];
    static STAMP_ONLY: EntityType =
        EntityType::new("StampOnly", "stamp_only", STAMP_ONLY_FIELDS, &[]);

    #[test]
    fn test_mark_sets_flag_and_timestamp() {
        let policy = SoftDeletePolicy::of(&FLAGGED);
        let now = Utc::now();
        let row = policy.mark(now).unwrap();
        assert_eq!(row.get("deleted"), Some(&Value::Bool(true)));
        assert_eq!(row.get("deleted_at"), Some(&Value::Timestamp(now)));
        assert!(policy.is_soft_deleted(&row));
    }

    #[test]
    fn test_visibility_filter_shape() {
        let policy = SoftDeletePolicy::of(&FLAGGED);
        assert_eq!(
            policy.visibility_filter().unwrap().to_string(),
            "(\"deleted\" IS NULL OR (\"deleted\" = false))"
        );
    }

    #[test]
    fn test_timestamp_without_flag_is_unsupported() {
        let policy = SoftDeletePolicy::of(&STAMP_ONLY);
        assert!(!policy.is_supported());
        assert!(policy.mark(Utc::now()).is_none());
        assert!(policy.visibility_filter().is_none());
    }
}
