//! Core types and traits for repokit.
//!
//! `repokit-core` is the **foundation layer** of the workspace. It defines the
//! traits and data types every other crate builds on.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: `Record` is implemented by user types (usually via
//!   `#[derive(Record)]`); `EntityType` is its static metadata.
//! - **Capability descriptor**: `EntityCapabilities` answers which column is
//!   the key, whether a concurrency token exists, and which soft-delete
//!   columns exist, resolved once per type.
//! - **Data model**: `Row` and `Value` carry query inputs/outputs between the
//!   session and a store.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from asupersync so
//!   every store-facing operation is cancel-correct.
//!
//! Most applications should use the `repokit` facade; reach for `repokit-core`
//! directly when writing a store.

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{CancelKind, CancelReason, Cx, Outcome};

pub mod entity;
pub mod error;
pub mod field;
pub mod key;
pub mod outcome;
pub mod record;
pub mod relationship;
pub mod row;
pub mod value;

pub use entity::{EntityCapabilities, EntityType, SoftDeleteSupport};
pub use error::{ConflictInfo, Error, Result, StoreError, StoreErrorKind};
pub use field::FieldInfo;
pub use key::{EntityKey, KeyValue};
pub use record::{AnyRecord, Record};
pub use relationship::{
    Collection, NavigationInfo, NavigationKind, Reference, Related, RelatedMany,
};
pub use row::{RelatedRows, Row};
pub use value::{FromValue, Value};
