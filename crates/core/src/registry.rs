//! Operation registry
//!
//! Maps each operation contract (`dyn Create<Product>`, `dyn ReadById<Order>`,
//! ...) to a factory building the strategy that serves it for a given session
//! container. The unit of work resolves through the registry on every call,
//! so the strategy always shares the unit of work's session.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use unitwork_common::{Error, Result};
use unitwork_contracts::{
    Create, CreateRange, Delete, DeleteRange, Entity, EntityId, ExistsByExternalId, ExistsById,
    HasCreatedMeta, HasDeletedMeta, HasExternalId, HasUpdatedMeta, Queryable, ReadByExternalId,
    ReadByExternalIdRange, ReadById, ReadByIdRange, Update, UpdateRange,
};

use crate::container::SessionContainer;
use crate::operations::{
    Actor, AuditedCreate, AuditedCreateRange, AuditedUpdate, AuditedUpdateRange, SessionCreate,
    SessionCreateRange, SessionDelete, SessionDeleteRange, SessionExistsById,
    SessionExternalIdOperation, SessionQueryable, SessionReadById, SessionReadByIdRange,
    SessionUpdate, SessionUpdateRange, SoftDelete, SoftDeleteRange,
};

type OperationFactory<Op> = Arc<dyn Fn(&SessionContainer) -> Arc<Op> + Send + Sync>;

struct Registration {
    name: &'static str,
    factory: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
pub struct OperationRegistry {
    registrations: HashMap<TypeId, Registration>,
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.registrations.values().map(|r| r.name).collect();
        names.sort_unstable();
        f.debug_struct("OperationRegistry")
            .field("operations", &names)
            .finish()
    }
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the strategy serving `Op`
    pub fn register<Op, F>(mut self, factory: F) -> Self
    where
        Op: ?Sized + 'static,
        F: Fn(&SessionContainer) -> Arc<Op> + Send + Sync + 'static,
    {
        let name = type_name::<Op>();
        let factory: OperationFactory<Op> = Arc::new(factory);
        if self
            .registrations
            .insert(
                TypeId::of::<Op>(),
                Registration {
                    name,
                    factory: Box::new(factory),
                },
            )
            .is_some()
        {
            debug!(operation = name, "Replaced operation registration");
        }
        self
    }

    /// Build the strategy serving `Op` against `container`
    pub fn resolve<Op: ?Sized + 'static>(&self, container: &SessionContainer) -> Result<Arc<Op>> {
        let registration = self.registrations.get(&TypeId::of::<Op>()).ok_or_else(|| {
            Error::Configuration(format!("No operation registered for {}", type_name::<Op>()))
        })?;
        let factory = registration
            .factory
            .downcast_ref::<OperationFactory<Op>>()
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "Registration for {} has an unexpected factory type",
                    registration.name
                ))
            })?;
        Ok(factory(container))
    }

    pub fn contains<Op: ?Sized + 'static>(&self) -> bool {
        self.registrations.contains_key(&TypeId::of::<Op>())
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Register the session-backed strategy for every id-keyed operation of `E`
    pub fn entity<E: Entity>(self) -> Self {
        self.register::<dyn Create<E>, _>(|c: &SessionContainer| -> Arc<dyn Create<E>> {
            Arc::new(SessionCreate::<E>::new(c.clone()))
        })
        .register::<dyn CreateRange<E>, _>(|c: &SessionContainer| -> Arc<dyn CreateRange<E>> {
            Arc::new(SessionCreateRange::<E>::new(c.clone()))
        })
        .register::<dyn ReadById<E>, _>(|c: &SessionContainer| -> Arc<dyn ReadById<E>> {
            Arc::new(SessionReadById::<E>::new(c.clone()))
        })
        .register::<dyn ReadByIdRange<E>, _>(|c: &SessionContainer| -> Arc<dyn ReadByIdRange<E>> {
            Arc::new(SessionReadByIdRange::<E>::new(c.clone()))
        })
        .register::<dyn Update<E>, _>(|c: &SessionContainer| -> Arc<dyn Update<E>> {
            Arc::new(SessionUpdate::<E>::new(c.clone()))
        })
        .register::<dyn UpdateRange<E>, _>(|c: &SessionContainer| -> Arc<dyn UpdateRange<E>> {
            Arc::new(SessionUpdateRange::<E>::new(c.clone()))
        })
        .register::<dyn Delete<E>, _>(|c: &SessionContainer| -> Arc<dyn Delete<E>> {
            Arc::new(SessionDelete::<E>::new(c.clone()))
        })
        .register::<dyn DeleteRange<E>, _>(|c: &SessionContainer| -> Arc<dyn DeleteRange<E>> {
            Arc::new(SessionDeleteRange::<E>::new(c.clone()))
        })
        .register::<dyn ExistsById<E>, _>(|c: &SessionContainer| -> Arc<dyn ExistsById<E>> {
            Arc::new(SessionExistsById::<E>::new(c.clone()))
        })
        .register::<dyn Queryable<E>, _>(|c: &SessionContainer| -> Arc<dyn Queryable<E>> {
            Arc::new(SessionQueryable::<E>::new(c.clone()))
        })
    }

    /// Register the external-id operations of `E` keyed by `X`
    pub fn external_id<E, X>(self) -> Self
    where
        E: HasExternalId<X>,
        X: EntityId,
    {
        self.register::<dyn ReadByExternalId<E, X>, _>(
            |c: &SessionContainer| -> Arc<dyn ReadByExternalId<E, X>> {
                Arc::new(SessionExternalIdOperation::<E, X>::new(c.clone()))
            },
        )
        .register::<dyn ReadByExternalIdRange<E, X>, _>(
            |c: &SessionContainer| -> Arc<dyn ReadByExternalIdRange<E, X>> {
                Arc::new(SessionExternalIdOperation::<E, X>::new(c.clone()))
            },
        )
        .register::<dyn ExistsByExternalId<E, X>, _>(
            |c: &SessionContainer| -> Arc<dyn ExistsByExternalId<E, X>> {
                Arc::new(SessionExternalIdOperation::<E, X>::new(c.clone()))
            },
        )
    }

    /// Stamp audit columns on create and update of `E`
    pub fn with_audit<E, By>(self, actor: Actor<By>) -> Self
    where
        E: HasCreatedMeta<By> + HasUpdatedMeta<By>,
        By: Send + Sync + 'static,
    {
        let create_actor = Arc::clone(&actor);
        let create_range_actor = Arc::clone(&actor);
        let update_actor = Arc::clone(&actor);
        self.register::<dyn Create<E>, _>(move |c: &SessionContainer| -> Arc<dyn Create<E>> {
            Arc::new(AuditedCreate::<E, By>::new(
                Arc::new(SessionCreate::<E>::new(c.clone())),
                Arc::clone(&create_actor),
            ))
        })
        .register::<dyn CreateRange<E>, _>(move |c: &SessionContainer| -> Arc<dyn CreateRange<E>> {
            Arc::new(AuditedCreateRange::<E, By>::new(
                Arc::new(SessionCreateRange::<E>::new(c.clone())),
                Arc::clone(&create_range_actor),
            ))
        })
        .register::<dyn Update<E>, _>(move |c: &SessionContainer| -> Arc<dyn Update<E>> {
            Arc::new(AuditedUpdate::<E, By>::new(
                Arc::new(SessionUpdate::<E>::new(c.clone())),
                Arc::clone(&update_actor),
            ))
        })
        .register::<dyn UpdateRange<E>, _>(move |c: &SessionContainer| -> Arc<dyn UpdateRange<E>> {
            Arc::new(AuditedUpdateRange::<E, By>::new(
                Arc::new(SessionUpdateRange::<E>::new(c.clone())),
                Arc::clone(&actor),
            ))
        })
    }

    /// Turn deletes of `E` into updates stamping the deletion columns
    pub fn with_soft_delete<E, By>(self, actor: Actor<By>) -> Self
    where
        E: HasDeletedMeta<By>,
        By: Send + Sync + 'static,
    {
        let delete_actor = Arc::clone(&actor);
        self.register::<dyn Delete<E>, _>(move |c: &SessionContainer| -> Arc<dyn Delete<E>> {
            Arc::new(SoftDelete::<E, By>::new(
                Arc::new(SessionUpdate::<E>::new(c.clone())),
                Arc::clone(&delete_actor),
            ))
        })
        .register::<dyn DeleteRange<E>, _>(move |c: &SessionContainer| -> Arc<dyn DeleteRange<E>> {
            Arc::new(SoftDeleteRange::<E, By>::new(
                Arc::new(SessionUpdateRange::<E>::new(c.clone())),
                Arc::clone(&actor),
            ))
        })
    }
}
