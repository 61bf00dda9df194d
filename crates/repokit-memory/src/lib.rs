//! In-memory transactional store for repokit.
//!
//! `repokit-memory` implements the `Store` interface over plain `Vec`s of
//! rows. It exists so the session and repository layers can be exercised end
//! to end without a database server, and doubles as the reference for what a
//! store must do:
//!
//! - evaluate `Expr` filters with SQL NULL semantics (`LIKE` via `regex`)
//! - order stably and apply limits
//! - resolve include paths into related rows
//! - apply a change set atomically, rejecting stale concurrency tokens
//! - assign generated keys and regenerate tokens on every write
//!
//! ```ignore
//! let db = MemoryDatabase::new();
//! let mut session = TrackingSession::new(db.open()?);
//! ```

pub mod database;
mod eval;
pub mod store;

pub use database::MemoryDatabase;
pub use store::MemoryStore;

// ============================================================================
// Unit Tests
// ============================================================================
