//! Generic repositories and units of work over a change-tracking session.
//!
//! `repokit` is the **primary user-facing crate**. It ties the workspace
//! together: record types derive `Record`, a [`UnitOfWorkFactory`] opens one
//! [`UnitOfWork`] per logical operation, and each unit hands out typed
//! [`Repository`] façades that query, mutate, and load navigations through
//! a single tracking session.
//!
//! # Role In The Architecture
//!
//! - **Facade**: re-exports the record model plus the query, session, and
//!   memory crates.
//! - **Repository**: tracked and untracked reads, includes, soft delete,
//!   optimistic concurrency via row versions, detach and reattach, and
//!   on-demand navigation loading.
//! - **Unit of work**: memoized repositories, atomic `commit`, `release`
//!   (also on drop).
//!
//! # Example
//!
//! ```ignore
//! use repokit::prelude::*;
//!
//! #[derive(Record, Debug, Clone)]
//! #[record(table = "heroes")]
//! struct Hero {
//!     #[record(primary_key, generated)]
//!     id: i64,
//!     name: String,
//!     #[record(row_version)]
//!     version: Option<Vec<u8>>,
//!     #[record(soft_delete)]
//!     deleted: bool,
//! }
//!
//! let factory = UnitOfWorkFactory::new(MemoryDatabase::new());
//! let mut uow = factory.begin()?;
//!
//! uow.repository::<Hero>().add(Hero { id: 0, name: "Deadpond".into(), version: None, deleted: false })?;
//! uow.commit(&cx).await?;
//!
//! let hero = uow.repository::<Hero>().get_by_id(&cx, 1_i64).await?;
//! uow.release();
//! ```

pub mod factory;
pub mod repository;
pub mod unit_of_work;

pub use factory::UnitOfWorkFactory;
pub use repository::{Repository, RepositoryState};
pub use unit_of_work::UnitOfWork;

pub use repokit_memory as memory;
pub use repokit_query as query;
pub use repokit_session as session;

pub use repokit_core::{
    CancelKind, CancelReason, Collection, ConflictInfo, Cx, EntityCapabilities, EntityType, Error, FieldInfo,
    NavigationInfo, NavigationKind, Outcome, Record, Reference, Related, RelatedMany, Result,
    Row, SoftDeleteSupport, StoreError, StoreErrorKind, Value,
};
pub use repokit_macros::Record;
pub use repokit_memory::{MemoryDatabase, MemoryStore};
pub use repokit_query::{Expr, Include, IncludePath, NavigationStep, OrderBy, Store, StoreFactory};
pub use repokit_session::{
    EntryId, EntryMut, EntryState, N1Detector, SessionConfig, SessionDebugInfo, TrackingSession,
};

/// Everything needed to declare records and work with repositories.
pub mod prelude {
    pub use crate::{Repository, UnitOfWork, UnitOfWorkFactory};
    pub use repokit_core::{
        Collection, Cx, Error, Outcome, Record, Reference, Related, RelatedMany, Result, Value,
        try_outcome, try_result,
    };
    pub use repokit_macros::Record;
    pub use repokit_memory::MemoryDatabase;
    pub use repokit_query::{Expr, Include, NavigationStep};
    pub use repokit_session::{EntryState, SessionConfig};
}
