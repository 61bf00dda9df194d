//! Query and store contracts for repokit.
//!
//! `repokit-query` sits between the tracking session and a backing store:
//!
//! - `Expr` and `OrderBy` describe what to read.
//! - `Include<T>` is a typed eager-load path, resolved to an `IncludePlan`.
//! - `SelectQuery` bundles them for one record type.
//! - `Change` is one pending write of a commit.
//! - `Store` / `StoreFactory` are the outbound traits a backing store implements.

pub mod change;
pub mod expr;
pub mod include;
pub mod select;
pub mod store;

pub use change::Change;
pub use expr::{BinaryOp, Expr};
pub use include::{Include, IncludePath, NavigationStep};
pub use select::{IncludePlan, IncludeStep, OrderBy, SelectQuery};
pub use store::{Store, StoreFactory};
