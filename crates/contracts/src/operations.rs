//! Operation contracts
//!
//! One trait per operation kind. Each implementation performs exactly one
//! persistence action for one entity type. Traits keyed by an external id
//! default that id to [`Uuid`](uuid::Uuid), so `dyn ReadByExternalId<Product>`
//! is the common form.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use unitwork_common::Result;

use crate::entity::{DefaultExternalId, Entity, EntityId, HasExternalId};
use crate::query::Query;

/// Queue an insert of one entity
#[async_trait]
pub trait Create<E: Entity>: Send + Sync {
    /// Returns the entity as accepted by the store, identity populated
    async fn create(&self, entity: E, ct: &CancellationToken) -> Result<E>;
}

/// Queue inserts of many entities with a single flush
#[async_trait]
pub trait CreateRange<E: Entity>: Send + Sync {
    async fn create_range(&self, entities: Vec<E>, ct: &CancellationToken) -> Result<Vec<E>>;
}

/// Read one entity by its identifier
#[async_trait]
pub trait ReadById<E: Entity>: Send + Sync {
    async fn read(&self, id: E::Id, ct: &CancellationToken) -> Result<Option<E>>;
}

/// Read the entities matching any of the identifiers, in no particular order
#[async_trait]
pub trait ReadByIdRange<E: Entity>: Send + Sync {
    async fn read_range(&self, ids: Vec<E::Id>, ct: &CancellationToken) -> Result<Vec<E>>;
}

/// Read one entity by its external identifier
#[async_trait]
pub trait ReadByExternalId<E, X = DefaultExternalId>: Send + Sync
where
    E: HasExternalId<X>,
    X: EntityId,
{
    async fn read(&self, external_id: X, ct: &CancellationToken) -> Result<Option<E>>;
}

/// Read the entities matching any of the external identifiers
#[async_trait]
pub trait ReadByExternalIdRange<E, X = DefaultExternalId>: Send + Sync
where
    E: HasExternalId<X>,
    X: EntityId,
{
    async fn read_range(&self, external_ids: Vec<X>, ct: &CancellationToken) -> Result<Vec<E>>;
}

/// Queue a replace of one entity
#[async_trait]
pub trait Update<E: Entity>: Send + Sync {
    async fn update(&self, entity: E, ct: &CancellationToken) -> Result<E>;
}

#[async_trait]
pub trait UpdateRange<E: Entity>: Send + Sync {
    async fn update_range(&self, entities: Vec<E>, ct: &CancellationToken) -> Result<Vec<E>>;
}

/// Queue a delete of one entity
#[async_trait]
pub trait Delete<E: Entity>: Send + Sync {
    async fn delete(&self, entity: E, ct: &CancellationToken) -> Result<E>;
}

#[async_trait]
pub trait DeleteRange<E: Entity>: Send + Sync {
    async fn delete_range(&self, entities: Vec<E>, ct: &CancellationToken) -> Result<Vec<E>>;
}

/// Existence check by identifier; a missing row is `false`, never an error
#[async_trait]
pub trait ExistsById<E: Entity>: Send + Sync {
    async fn exists(&self, id: E::Id, ct: &CancellationToken) -> Result<bool>;
}

#[async_trait]
pub trait ExistsByExternalId<E, X = DefaultExternalId>: Send + Sync
where
    E: HasExternalId<X>,
    X: EntityId,
{
    async fn exists(&self, external_id: X, ct: &CancellationToken) -> Result<bool>;
}

/// Source of a lazy read sequence over every row of the entity type
pub trait Queryable<E: Entity>: Send + Sync {
    fn query(&self) -> Query<E>;
}
