//! Error types for repokit.

use std::fmt;

use crate::value::Value;

/// Result alias used throughout repokit.
pub type Result<T> = std::result::Result<T, Error>;

/// The identity of the entry whose optimistic-concurrency check failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictInfo {
    /// Table of the conflicting record.
    pub entity: &'static str,
    /// Primary key of the conflicting record.
    pub key: Value,
}

/// Classification of a backing-store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Connection-level failure (lost connection, closed handle).
    Io,
    /// A constraint was violated (duplicate key, foreign key).
    Constraint,
    /// The store gave up waiting.
    Timeout,
}

impl StoreErrorKind {
    /// Human-readable label for the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            StoreErrorKind::Io => "io",
            StoreErrorKind::Constraint => "constraint",
            StoreErrorKind::Timeout => "timeout",
        }
    }
}

/// A failure reported by the backing store. Propagated unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    /// What went wrong.
    pub kind: StoreErrorKind,
    /// Store-provided detail.
    pub message: String,
}

impl StoreError {
    /// Create a store error.
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// All errors surfaced by repokit.
///
/// "Not found" is deliberately absent: lookups return `Ok(None)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A record type declares zero or more than one primary-key field.
    UnsupportedKeyShape {
        /// Table of the offending type.
        entity: &'static str,
        /// Number of key fields declared.
        key_fields: usize,
    },
    /// A commit found a stale original concurrency token.
    ConcurrencyConflict(ConflictInfo),
    /// The key is already tracked by another instance in this session.
    IdentityConflict {
        /// Table of the record.
        entity: &'static str,
        /// Primary key already present in the registry.
        key: Value,
    },
    /// The operation needs a tracked record but none is tracked for the key.
    NotTracked {
        /// Table of the record.
        entity: &'static str,
    },
    /// A navigation name that the record type does not declare.
    UnknownNavigation {
        /// Table of the owning record.
        entity: &'static str,
        /// Requested navigation.
        navigation: String,
    },
    /// A column value could not be converted to the field type.
    Conversion {
        /// Column being decoded.
        column: String,
        /// Expected SQL-ish type name.
        expected: &'static str,
        /// Actual type name found.
        found: &'static str,
    },
    /// Failure from the backing store.
    Store(StoreError),
    /// The session was already released.
    SessionReleased,
    /// Anything else.
    Custom(String),
}

impl Error {
    /// Whether this is an optimistic-concurrency conflict.
    #[must_use]
    pub const fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Error::ConcurrencyConflict(_))
    }

    /// Whether this is an identity conflict.
    #[must_use]
    pub const fn is_identity_conflict(&self) -> bool {
        matches!(self, Error::IdentityConflict { .. })
    }

    /// Shorthand for a store failure.
    pub fn store(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Error::Store(StoreError::new(kind, message))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedKeyShape { entity, key_fields } => write!(
                f,
                "entity `{entity}` must declare exactly one primary-key field, found {key_fields}"
            ),
            Error::ConcurrencyConflict(info) => write!(
                f,
                "concurrency conflict on `{}` with key {}: the row was changed or removed since it was read",
                info.entity, info.key
            ),
            Error::IdentityConflict { entity, key } => write!(
                f,
                "another instance of `{entity}` with key {key} is already tracked"
            ),
            Error::NotTracked { entity } => {
                write!(f, "record of `{entity}` is not tracked by this session")
            }
            Error::UnknownNavigation { entity, navigation } => {
                write!(f, "entity `{entity}` has no navigation named `{navigation}`")
            }
            Error::Conversion {
                column,
                expected,
                found,
            } => write!(f, "column `{column}`: expected {expected}, found {found}"),
            Error::Store(e) => write!(f, "store error ({}): {}", e.kind.as_str(), e.message),
            Error::SessionReleased => f.write_str("tracking session has already been released"),
            Error::Custom(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_display_names_entity_and_key() {
        let err = Error::ConcurrencyConflict(ConflictInfo {
            entity: "heroes",
            key: Value::BigInt(4),
        });
        assert!(err.is_concurrency_conflict());
        assert!(err.to_string().contains("heroes"));
        assert!(err.to_string().contains('4'));
    }

    #[test]
    fn test_store_error_conversion() {
        let err: Error = StoreError::new(StoreErrorKind::Timeout, "slow").into();
        assert_eq!(err.to_string(), "store error (timeout): slow");
    }
}
