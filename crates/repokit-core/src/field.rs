//! Field and column definitions.

/// Metadata about a record field/column.
///
/// The flags describe the optional capabilities a record type opts into.
/// They are declared once per type (usually by `#[derive(Record)]`) and
/// resolved into an `EntityCapabilities` descriptor by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Rust field name
    pub name: &'static str,
    /// Column name (may differ from field name)
    pub column_name: &'static str,
    /// Whether this field is nullable
    pub nullable: bool,
    /// Whether this is a primary key
    pub primary_key: bool,
    /// Whether the store assigns this value on insert (auto-increment keys)
    pub store_generated: bool,
    /// Whether this is the optimistic-concurrency token, regenerated by the
    /// store on every write
    pub concurrency_token: bool,
    /// Whether this is the soft-delete flag
    pub soft_delete_flag: bool,
    /// Whether this is the soft-delete timestamp
    pub deletion_timestamp: bool,
}

impl FieldInfo {
    /// Create a new field info with minimal required data.
    pub const fn new(name: &'static str, column_name: &'static str) -> Self {
        Self {
            name,
            column_name,
            nullable: false,
            primary_key: false,
            store_generated: false,
            concurrency_token: false,
            soft_delete_flag: false,
            deletion_timestamp: false,
        }
    }

    /// Set nullable flag.
    #[must_use]
    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Set primary key flag.
    #[must_use]
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Set store-generated flag.
    #[must_use]
    pub const fn store_generated(mut self, value: bool) -> Self {
        self.store_generated = value;
        self
    }

    /// Mark this field as the concurrency token.
    ///
    /// Tokens are always nullable: a record that was never written has none.
    #[must_use]
    pub const fn concurrency_token(mut self, value: bool) -> Self {
        self.concurrency_token = value;
        self.nullable = self.nullable || value;
        self
    }

    /// Mark this field as the soft-delete flag.
    #[must_use]
    pub const fn soft_delete_flag(mut self, value: bool) -> Self {
        self.soft_delete_flag = value;
        self
    }

    /// Mark this field as the soft-delete timestamp.
    #[must_use]
    pub const fn deletion_timestamp(mut self, value: bool) -> Self {
        self.deletion_timestamp = value;
        self.nullable = self.nullable || value;
        self
    }
}
