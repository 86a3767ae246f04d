//! Session-backed operation strategies
//!
//! The default implementation of every operation contract. Each one holds
//! the session container it runs against; writes go through
//! [`SessionContainer::execute`] so a single call (range calls included)
//! ends in at most one flush.

pub mod audited;
pub mod soft_delete;

use std::marker::PhantomData;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use unitwork_common::{Error, Result};
use unitwork_contracts::{
    Create, CreateRange, Delete, DeleteRange, Entity, EntityId, ExistsByExternalId, ExistsById,
    Filter, HasExternalId, Query, Queryable, ReadByExternalId, ReadByExternalIdRange, ReadById,
    ReadByIdRange, Update, UpdateRange,
};

use crate::container::SessionContainer;

pub use audited::{AuditedCreate, AuditedCreateRange, AuditedUpdate, AuditedUpdateRange, Actor};
pub use soft_delete::{SoftDelete, SoftDeleteRange};

macro_rules! session_operation {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub struct $name<E> {
            container: SessionContainer,
            _entity: PhantomData<fn() -> E>,
        }

        impl<E> $name<E> {
            pub fn new(container: SessionContainer) -> Self {
                Self {
                    container,
                    _entity: PhantomData,
                }
            }
        }
    };
}

session_operation!(
    /// Adds one entity to the session
    SessionCreate
);
session_operation!(SessionCreateRange);
session_operation!(
    /// Reads one entity by id through the query pipeline
    SessionReadById
);
session_operation!(SessionReadByIdRange);
session_operation!(SessionUpdate);
session_operation!(SessionUpdateRange);
session_operation!(SessionDelete);
session_operation!(SessionDeleteRange);
session_operation!(SessionExistsById);
session_operation!(SessionQueryable);

/// Operations keyed by an external identifier carry its type too
pub struct SessionExternalIdOperation<E, X> {
    container: SessionContainer,
    _entity: PhantomData<fn() -> (E, X)>,
}

impl<E, X> SessionExternalIdOperation<E, X> {
    pub fn new(container: SessionContainer) -> Self {
        Self {
            container,
            _entity: PhantomData,
        }
    }
}

fn id_query<E: Entity>(container: &SessionContainer, id: &E::Id) -> Query<E> {
    container
        .query::<E>()
        .filter(Filter::eq(E::ID_COLUMN, id.to_field()))
}

fn external_id_query<E, X>(container: &SessionContainer, external_id: &X) -> Query<E>
where
    E: HasExternalId<X>,
    X: EntityId,
{
    container
        .query::<E>()
        .filter(Filter::eq(E::EXTERNAL_ID_COLUMN, external_id.to_field()))
}

#[async_trait]
impl<E: Entity> Create<E> for SessionCreate<E> {
    async fn create(&self, entity: E, ct: &CancellationToken) -> Result<E> {
        self.container
            .execute(|ctx, entity| Box::pin(async move { ctx.add(entity).await }), entity, ct)
            .await
    }
}

#[async_trait]
impl<E: Entity> CreateRange<E> for SessionCreateRange<E> {
    async fn create_range(&self, entities: Vec<E>, ct: &CancellationToken) -> Result<Vec<E>> {
        if entities.is_empty() {
            return Ok(entities);
        }
        self.container
            .execute(
                |ctx, entities: Vec<E>| {
                    Box::pin(async move {
                        let mut created = Vec::with_capacity(entities.len());
                        for entity in entities {
                            created.push(ctx.add(entity).await?);
                        }
                        Ok(created)
                    })
                },
                entities,
                ct,
            )
            .await
    }
}

#[async_trait]
impl<E: Entity> ReadById<E> for SessionReadById<E> {
    async fn read(&self, id: E::Id, ct: &CancellationToken) -> Result<Option<E>> {
        id_query::<E>(&self.container, &id).single_or_none(ct).await
    }
}

#[async_trait]
impl<E: Entity> ReadByIdRange<E> for SessionReadByIdRange<E> {
    async fn read_range(&self, ids: Vec<E::Id>, ct: &CancellationToken) -> Result<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.container
            .query::<E>()
            .filter(Filter::is_in(E::ID_COLUMN, ids.iter().map(EntityId::to_field)))
            .to_list(ct)
            .await
    }
}

#[async_trait]
impl<E, X> ReadByExternalId<E, X> for SessionExternalIdOperation<E, X>
where
    E: HasExternalId<X>,
    X: EntityId,
{
    async fn read(&self, external_id: X, ct: &CancellationToken) -> Result<Option<E>> {
        external_id_query::<E, X>(&self.container, &external_id)
            .single_or_none(ct)
            .await
    }
}

#[async_trait]
impl<E, X> ReadByExternalIdRange<E, X> for SessionExternalIdOperation<E, X>
where
    E: HasExternalId<X>,
    X: EntityId,
{
    async fn read_range(&self, external_ids: Vec<X>, ct: &CancellationToken) -> Result<Vec<E>> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.container
            .query::<E>()
            .filter(Filter::is_in(
                E::EXTERNAL_ID_COLUMN,
                external_ids.iter().map(EntityId::to_field),
            ))
            .to_list(ct)
            .await
    }
}

#[async_trait]
impl<E, X> ExistsByExternalId<E, X> for SessionExternalIdOperation<E, X>
where
    E: HasExternalId<X>,
    X: EntityId,
{
    async fn exists(&self, external_id: X, ct: &CancellationToken) -> Result<bool> {
        external_id_query::<E, X>(&self.container, &external_id)
            .any(ct)
            .await
    }
}

#[async_trait]
impl<E: Entity> Update<E> for SessionUpdate<E> {
    async fn update(&self, entity: E, ct: &CancellationToken) -> Result<E> {
        self.container
            .execute(|ctx, entity| Box::pin(async move { ctx.update(entity) }), entity, ct)
            .await
    }
}

#[async_trait]
impl<E: Entity> UpdateRange<E> for SessionUpdateRange<E> {
    async fn update_range(&self, entities: Vec<E>, ct: &CancellationToken) -> Result<Vec<E>> {
        if entities.is_empty() {
            return Ok(entities);
        }
        for entity in &entities {
            require_id(entity, "update")?;
        }
        self.container
            .execute(
                |ctx, entities: Vec<E>| {
                    Box::pin(async move {
                        entities
                            .into_iter()
                            .map(|entity| ctx.update(entity))
                            .collect::<Result<Vec<E>>>()
                    })
                },
                entities,
                ct,
            )
            .await
    }
}

#[async_trait]
impl<E: Entity> Delete<E> for SessionDelete<E> {
    async fn delete(&self, entity: E, ct: &CancellationToken) -> Result<E> {
        self.container
            .execute(|ctx, entity| Box::pin(async move { ctx.remove(entity) }), entity, ct)
            .await
    }
}

#[async_trait]
impl<E: Entity> DeleteRange<E> for SessionDeleteRange<E> {
    async fn delete_range(&self, entities: Vec<E>, ct: &CancellationToken) -> Result<Vec<E>> {
        if entities.is_empty() {
            return Ok(entities);
        }
        for entity in &entities {
            require_id(entity, "delete")?;
        }
        self.container
            .execute(
                |ctx, entities: Vec<E>| {
                    Box::pin(async move {
                        entities
                            .into_iter()
                            .map(|entity| ctx.remove(entity))
                            .collect::<Result<Vec<E>>>()
                    })
                },
                entities,
                ct,
            )
            .await
    }
}

#[async_trait]
impl<E: Entity> ExistsById<E> for SessionExistsById<E> {
    async fn exists(&self, id: E::Id, ct: &CancellationToken) -> Result<bool> {
        id_query::<E>(&self.container, &id).any(ct).await
    }
}

impl<E: Entity> Queryable<E> for SessionQueryable<E> {
    fn query(&self) -> Query<E> {
        self.container.query::<E>()
    }
}

/// Reject entities whose id was never assigned before touching the session
pub(crate) fn require_id<E: Entity>(entity: &E, action: &str) -> Result<()> {
    if entity.id().is_unassigned() {
        return Err(Error::InvalidArgument(format!(
            "cannot {} a {} without an id",
            action,
            E::meta().entity
        )));
    }
    Ok(())
}
