//! Unit of work facade
//!
//! One object exposing every operation for every registered entity type,
//! bound to a single session container. Each call resolves the registered
//! strategy against that container and delegates to it.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use unitwork_common::Result;
use unitwork_contracts::{
    Create, CreateRange, Delete, DeleteRange, DefaultExternalId, Entity, EntityId,
    ExistsByExternalId, ExistsById, HasExternalId, Query, Queryable, ReadByExternalId,
    ReadByExternalIdRange, ReadById, ReadByIdRange, Update, UpdateRange,
};

use crate::container::SessionContainer;
use crate::registry::OperationRegistry;
use crate::transaction::Transaction;

#[derive(Clone)]
pub struct UnitOfWork {
    container: SessionContainer,
    registry: Arc<OperationRegistry>,
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("container", &self.container)
            .finish()
    }
}

impl UnitOfWork {
    pub fn new(container: SessionContainer, registry: Arc<OperationRegistry>) -> Self {
        Self {
            container,
            registry,
        }
    }

    /// The session container every operation of this unit of work shares
    pub fn container(&self) -> &SessionContainer {
        &self.container
    }

    /// Resolve any registered operation against this unit of work's session
    pub fn resolve<Op: ?Sized + 'static>(&self) -> Result<Arc<Op>> {
        self.registry.resolve::<Op>(&self.container)
    }

    /// Open a transaction on the shared session.
    ///
    /// If begin fails the half-built transaction is disposed and the begin
    /// error is returned.
    pub async fn begin_transaction(&self, ct: &CancellationToken) -> Result<Transaction> {
        let mut transaction = Transaction::new(self.container.clone());
        if let Err(e) = transaction.begin(ct).await {
            warn!(error = %e, "Failed to begin transaction");
            transaction.dispose().await;
            return Err(e);
        }
        Ok(transaction)
    }

    /// Flush pending changes; returns how many were written
    pub async fn save_changes(&self, ct: &CancellationToken) -> Result<usize> {
        self.container.save_changes(ct).await
    }

    pub async fn create<E: Entity>(&self, entity: E, ct: &CancellationToken) -> Result<E> {
        debug!(entity = E::meta().entity, "create");
        self.resolve::<dyn Create<E>>()?.create(entity, ct).await
    }

    pub async fn create_range<E, I>(&self, entities: I, ct: &CancellationToken) -> Result<Vec<E>>
    where
        E: Entity,
        I: IntoIterator<Item = E>,
    {
        let entities: Vec<E> = entities.into_iter().collect();
        debug!(entity = E::meta().entity, count = entities.len(), "create_range");
        self.resolve::<dyn CreateRange<E>>()?
            .create_range(entities, ct)
            .await
    }

    pub async fn read_by_id<E: Entity>(
        &self,
        id: E::Id,
        ct: &CancellationToken,
    ) -> Result<Option<E>> {
        self.resolve::<dyn ReadById<E>>()?.read(id, ct).await
    }

    pub async fn read_by_id_range<E, I>(&self, ids: I, ct: &CancellationToken) -> Result<Vec<E>>
    where
        E: Entity,
        I: IntoIterator<Item = E::Id>,
    {
        let ids: Vec<E::Id> = ids.into_iter().collect();
        self.resolve::<dyn ReadByIdRange<E>>()?
            .read_range(ids, ct)
            .await
    }

    pub async fn read_by_external_id<E, X>(
        &self,
        external_id: X,
        ct: &CancellationToken,
    ) -> Result<Option<E>>
    where
        E: HasExternalId<X>,
        X: EntityId,
    {
        self.resolve::<dyn ReadByExternalId<E, X>>()?
            .read(external_id, ct)
            .await
    }

    pub async fn read_by_external_id_range<E, X, I>(
        &self,
        external_ids: I,
        ct: &CancellationToken,
    ) -> Result<Vec<E>>
    where
        E: HasExternalId<X>,
        X: EntityId,
        I: IntoIterator<Item = X>,
    {
        let external_ids: Vec<X> = external_ids.into_iter().collect();
        self.resolve::<dyn ReadByExternalIdRange<E, X>>()?
            .read_range(external_ids, ct)
            .await
    }

    pub async fn update<E: Entity>(&self, entity: E, ct: &CancellationToken) -> Result<E> {
        debug!(entity = E::meta().entity, "update");
        self.resolve::<dyn Update<E>>()?.update(entity, ct).await
    }

    pub async fn update_range<E, I>(&self, entities: I, ct: &CancellationToken) -> Result<Vec<E>>
    where
        E: Entity,
        I: IntoIterator<Item = E>,
    {
        let entities: Vec<E> = entities.into_iter().collect();
        debug!(entity = E::meta().entity, count = entities.len(), "update_range");
        self.resolve::<dyn UpdateRange<E>>()?
            .update_range(entities, ct)
            .await
    }

    pub async fn delete<E: Entity>(&self, entity: E, ct: &CancellationToken) -> Result<E> {
        debug!(entity = E::meta().entity, "delete");
        self.resolve::<dyn Delete<E>>()?.delete(entity, ct).await
    }

    pub async fn delete_range<E, I>(&self, entities: I, ct: &CancellationToken) -> Result<Vec<E>>
    where
        E: Entity,
        I: IntoIterator<Item = E>,
    {
        let entities: Vec<E> = entities.into_iter().collect();
        debug!(entity = E::meta().entity, count = entities.len(), "delete_range");
        self.resolve::<dyn DeleteRange<E>>()?
            .delete_range(entities, ct)
            .await
    }

    pub async fn exists_by_id<E: Entity>(&self, id: E::Id, ct: &CancellationToken) -> Result<bool> {
        self.resolve::<dyn ExistsById<E>>()?.exists(id, ct).await
    }

    pub async fn exists_by_external_id<E, X>(
        &self,
        external_id: X,
        ct: &CancellationToken,
    ) -> Result<bool>
    where
        E: HasExternalId<X>,
        X: EntityId,
    {
        self.resolve::<dyn ExistsByExternalId<E, X>>()?
            .exists(external_id, ct)
            .await
    }

    /// Lazy read sequence over all rows of `E`
    pub fn query<E: Entity>(&self) -> Result<Query<E>> {
        Ok(self.resolve::<dyn Queryable<E>>()?.query())
    }

    /// [`read_by_external_id`](Self::read_by_external_id) with the default
    /// external id type
    pub async fn read_by_uuid<E>(
        &self,
        external_id: DefaultExternalId,
        ct: &CancellationToken,
    ) -> Result<Option<E>>
    where
        E: HasExternalId<DefaultExternalId>,
    {
        self.read_by_external_id::<E, DefaultExternalId>(external_id, ct)
            .await
    }
}
