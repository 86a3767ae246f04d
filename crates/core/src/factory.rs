//! Unit of work factory
//!
//! Produces independent, scoped units of work: each one opens its own
//! session through the provider, so units created by the same factory never
//! share pending changes or transactions.

use std::ops::Deref;
use std::sync::Arc;

use tracing::{debug, info, warn};
use unitwork_common::{ContainerOptions, Result};

use crate::container::SessionContainer;
use crate::registry::OperationRegistry;
use crate::session::SessionProvider;
use crate::unit_of_work::UnitOfWork;

#[derive(Clone)]
pub struct UnitOfWorkFactory {
    provider: Arc<dyn SessionProvider>,
    registry: Arc<OperationRegistry>,
    options: ContainerOptions,
}

impl std::fmt::Debug for UnitOfWorkFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWorkFactory")
            .field("backend", &self.provider.backend())
            .field("registry", &self.registry)
            .field("options", &self.options)
            .finish()
    }
}

impl UnitOfWorkFactory {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        registry: OperationRegistry,
        options: ContainerOptions,
    ) -> Self {
        info!(
            backend = provider.backend(),
            operations = registry.len(),
            auto_save_changes = options.auto_save_changes,
            no_tracking = options.no_tracking,
            "Unit of work factory ready"
        );
        Self {
            provider,
            registry: Arc::new(registry),
            options,
        }
    }

    pub fn options(&self) -> ContainerOptions {
        self.options
    }

    /// Open a fresh session and wrap it in a new scoped unit of work
    pub async fn create(&self) -> Result<ScopedUnitOfWork> {
        let session = self.provider.open().await?;
        let container = SessionContainer::new(session, self.options);
        debug!(backend = container.backend(), "Unit of work created");
        Ok(ScopedUnitOfWork {
            unit_of_work: UnitOfWork::new(container, Arc::clone(&self.registry)),
            disposed: false,
        })
    }
}

/// A unit of work owning its session for the lifetime of the scope.
///
/// Call [`dispose`](Self::dispose) to release the session; dropping the scope
/// without disposing releases it on a best-effort basis.
pub struct ScopedUnitOfWork {
    unit_of_work: UnitOfWork,
    disposed: bool,
}

impl ScopedUnitOfWork {
    /// Close the session, discarding unflushed changes and rolling back any
    /// open transaction. Idempotent.
    pub async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Err(e) = self.unit_of_work.container().close().await {
            warn!(error = %e, "Failed to close session");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Deref for ScopedUnitOfWork {
    type Target = UnitOfWork;

    fn deref(&self) -> &UnitOfWork {
        &self.unit_of_work
    }
}

impl Drop for ScopedUnitOfWork {
    #[mutants::skip]
    fn drop(&mut self) {
        if !self.disposed {
            self.unit_of_work.container().close_detached();
        }
    }
}
