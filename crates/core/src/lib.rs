//! Unit-of-work runtime for Unitwork
//!
//! Session containers, session-backed operation strategies, the operation
//! registry, transactions and the unit of work with its factory. Backends
//! plug in through [`Session`] and [`SessionProvider`].

pub mod container;
pub mod factory;
pub mod operations;
pub mod registry;
pub mod session;
pub mod tracker;
pub mod transaction;
pub mod unit_of_work;

#[cfg(test)]
pub(crate) mod testing;

pub use container::{SessionContainer, SessionContext};
pub use factory::{ScopedUnitOfWork, UnitOfWorkFactory};
pub use operations::Actor;
pub use registry::OperationRegistry;
pub use session::{row_key, Change, ChangeKind, Session, SessionProvider};
pub use tracker::ChangeTracker;
pub use transaction::{Transaction, TransactionState};
pub use unit_of_work::UnitOfWork;

pub use unitwork_common::ContainerOptions;
