//! Variadic forms of the range operations
//!
//! Each method accepts anything iterable (arrays included) and forwards to the
//! sequence form of the operation.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use unitwork_common::Result;

use crate::entity::{Entity, EntityId, HasExternalId};
use crate::operations::{CreateRange, DeleteRange, ReadByExternalIdRange, ReadByIdRange, UpdateRange};

#[async_trait]
pub trait CreateRangeExt<E: Entity> {
    async fn create_each<I>(&self, ct: &CancellationToken, entities: I) -> Result<Vec<E>>
    where
        I: IntoIterator<Item = E> + Send,
        I::IntoIter: Send;
}

#[async_trait]
impl<E: Entity, T: CreateRange<E> + ?Sized> CreateRangeExt<E> for T {
    async fn create_each<I>(&self, ct: &CancellationToken, entities: I) -> Result<Vec<E>>
    where
        I: IntoIterator<Item = E> + Send,
        I::IntoIter: Send,
    {
        self.create_range(entities.into_iter().collect(), ct).await
    }
}

#[async_trait]
pub trait ReadByIdRangeExt<E: Entity> {
    async fn read_each<I>(&self, ct: &CancellationToken, ids: I) -> Result<Vec<E>>
    where
        I: IntoIterator<Item = E::Id> + Send,
        I::IntoIter: Send;
}

#[async_trait]
impl<E: Entity, T: ReadByIdRange<E> + ?Sized> ReadByIdRangeExt<E> for T {
    async fn read_each<I>(&self, ct: &CancellationToken, ids: I) -> Result<Vec<E>>
    where
        I: IntoIterator<Item = E::Id> + Send,
        I::IntoIter: Send,
    {
        self.read_range(ids.into_iter().collect(), ct).await
    }
}

#[async_trait]
pub trait ReadByExternalIdRangeExt<E: HasExternalId<X>, X: EntityId> {
    async fn read_each<I>(&self, ct: &CancellationToken, external_ids: I) -> Result<Vec<E>>
    where
        I: IntoIterator<Item = X> + Send,
        I::IntoIter: Send;
}

#[async_trait]
impl<E, X, T> ReadByExternalIdRangeExt<E, X> for T
where
    E: HasExternalId<X>,
    X: EntityId,
    T: ReadByExternalIdRange<E, X> + ?Sized,
{
    async fn read_each<I>(&self, ct: &CancellationToken, external_ids: I) -> Result<Vec<E>>
    where
        I: IntoIterator<Item = X> + Send,
        I::IntoIter: Send,
    {
        self.read_range(external_ids.into_iter().collect(), ct).await
    }
}

#[async_trait]
pub trait UpdateRangeExt<E: Entity> {
    async fn update_each<I>(&self, ct: &CancellationToken, entities: I) -> Result<Vec<E>>
    where
        I: IntoIterator<Item = E> + Send,
        I::IntoIter: Send;
}

#[async_trait]
impl<E: Entity, T: UpdateRange<E> + ?Sized> UpdateRangeExt<E> for T {
    async fn update_each<I>(&self, ct: &CancellationToken, entities: I) -> Result<Vec<E>>
    where
        I: IntoIterator<Item = E> + Send,
        I::IntoIter: Send,
    {
        self.update_range(entities.into_iter().collect(), ct).await
    }
}

#[async_trait]
pub trait DeleteRangeExt<E: Entity> {
    async fn delete_each<I>(&self, ct: &CancellationToken, entities: I) -> Result<Vec<E>>
    where
        I: IntoIterator<Item = E> + Send,
        I::IntoIter: Send;
}

#[async_trait]
impl<E: Entity, T: DeleteRange<E> + ?Sized> DeleteRangeExt<E> for T {
    async fn delete_each<I>(&self, ct: &CancellationToken, entities: I) -> Result<Vec<E>>
    where
        I: IntoIterator<Item = E> + Send,
        I::IntoIter: Send,
    {
        self.delete_range(entities.into_iter().collect(), ct).await
    }
}
