//! Concurrency token resolver.
//!
//! A record type may declare one column as its optimistic-concurrency token:
//! opaque bytes the store regenerates on every successful write. The session
//! keeps two values per entry:
//!
//! - the *current* token, which is simply the record's token column, and
//! - the *original* token, the value the caller's edit assumes the stored row
//!   still carries. Commit sends it as the expected token of the write.
//!
//! Both are independently settable. A `None` original skips the check.

use repokit_core::{EntityCapabilities, Result, Row, Value};

use crate::registry::TrackedEntry;

/// Access to the token column of one record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyToken {
    column: &'static str,
}

impl ConcurrencyToken {
    /// The token of a record type, or `None` when it declares none.
    #[must_use]
    pub fn resolve(caps: &EntityCapabilities) -> Option<Self> {
        caps.concurrency_token.map(|column| Self { column })
    }

    /// Token column name.
    #[must_use]
    pub const fn column(&self) -> &'static str {
        self.column
    }

    /// Token carried by `row`. NULL reads as `None`.
    #[must_use]
    pub fn read(&self, row: &Row) -> Option<Vec<u8>> {
        row.get(self.column)
            .and_then(Value::as_bytes)
            .map(<[u8]>::to_vec)
    }

    /// A one-column row that sets the token to `token`.
    #[must_use]
    pub fn patch(&self, token: Option<Vec<u8>>) -> Row {
        Row::from_pairs([(self.column, token.map_or(Value::Null, Value::Bytes))])
    }

    /// Current token of a tracked entry.
    pub(crate) fn current(&self, entry: &TrackedEntry) -> Option<Vec<u8>> {
        self.read(&entry.record.row())
    }

    /// Overwrite the current token of a tracked entry.
    ///
    /// The snapshot follows along so that the change alone does not make the
    /// entry look modified.
    pub(crate) fn set_current(
        &self,
        entry: &mut TrackedEntry,
        token: Option<Vec<u8>>,
    ) -> Result<()> {
        let patch = self.patch(token);
        entry.record.apply(&patch)?;
        for (column, value) in patch.iter() {
            entry.snapshot.set(column, value.clone());
        }
        Ok(())
    }

    /// Original token of a tracked entry.
    pub(crate) fn original<'e>(&self, entry: &'e TrackedEntry) -> Option<&'e [u8]> {
        entry.original_token.as_deref()
    }

    /// Overwrite the original token of a tracked entry.
    pub(crate) fn set_original(&self, entry: &mut TrackedEntry, token: Option<Vec<u8>>) {
        entry.original_token = token;
    }

    /// Null both the current and the original token.
    pub(crate) fn clear(&self, entry: &mut TrackedEntry) -> Result<()> {
        self.set_current(entry, None)?;
        self.set_original(entry, None);
        Ok(())
    }
}

/// Token a commit expects the stored row of `entry` to carry.
pub(crate) fn expected_token(entry: &TrackedEntry) -> Option<Vec<u8>> {
    ConcurrencyToken::resolve(&entry.caps)
        .and_then(|token| token.original(entry))
        .map(<[u8]>::to_vec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use repokit_core::{EntityType, FieldInfo};

    static FIELDS: &[FieldInfo] = &[
        FieldInfo::new("id", "id").primary_key(true),
        FieldInfo::new("version", "row_version").concurrency_token(true),
    ];
    static VERSIONED: EntityType = EntityType::new("Versioned", "versioned", FIELDS, &[]);
    static PLAIN_FIELDS: &[FieldInfo] = &[FieldInfo::new("id", "id").primary_key(true)];
    static PLAIN: EntityType = EntityType::new("Plain", "plain", PLAIN_FIELDS, &[]);

    #[test]
    fn test_resolve_only_with_token_column() {
        let caps = EntityCapabilities::resolve(&VERSIONED).unwrap();
        assert_eq!(
            ConcurrencyToken::resolve(&caps).map(|t| t.column()),
            Some("row_version")
        );

        let caps = EntityCapabilities::resolve(&PLAIN).unwrap();
        assert!(ConcurrencyToken::resolve(&caps).is_none());
    }

    #[test]
    fn test_read_and_patch() {
        let caps = EntityCapabilities::resolve(&VERSIONED).unwrap();
        let token = ConcurrencyToken::resolve(&caps).unwrap();

        let row = token.patch(Some(vec![0, 0, 0, 1]));
        assert_eq!(token.read(&row), Some(vec![0, 0, 0, 1]));

        let cleared = token.patch(None);
        assert_eq!(cleared.get("row_version"), Some(&Value::Null));
        assert_eq!(token.read(&cleared), None);
    }
}
