//! Creating units of work.

use repokit_core::Result;
use repokit_query::StoreFactory;
use repokit_session::SessionConfig;

use crate::unit_of_work::UnitOfWork;

/// Opens a fresh [`UnitOfWork`] per logical operation.
#[derive(Debug, Clone)]
pub struct UnitOfWorkFactory<F: StoreFactory> {
    stores: F,
    config: SessionConfig,
}

impl<F: StoreFactory> UnitOfWorkFactory<F> {
    /// Factory with default session configuration.
    pub fn new(stores: F) -> Self {
        Self::with_config(stores, SessionConfig::default())
    }

    /// Factory whose units of work use `config`.
    pub fn with_config(stores: F, config: SessionConfig) -> Self {
        Self { stores, config }
    }

    /// Session configuration handed to every unit of work.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The store factory.
    pub fn stores(&self) -> &F {
        &self.stores
    }

    /// Open a store handle and wrap it in a new unit of work.
    pub fn begin(&self) -> Result<UnitOfWork<F::Store>> {
        let store = self.stores.open()?;
        Ok(UnitOfWork::with_config(store, self.config.clone()))
    }
}
