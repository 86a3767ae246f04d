//! Logical deletion
//!
//! Turns a delete into an update that stamps the deletion columns. Rows stay
//! readable; callers that want live rows filter on the deletion column with
//! `query.is_null(E::DELETED_ON_COLUMN)`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use unitwork_common::Result;
use unitwork_contracts::{Delete, DeleteRange, Entity, HasDeletedMeta, Update, UpdateRange};

use super::audited::Actor;
use super::require_id;

pub struct SoftDelete<E: Entity, By = String> {
    inner: Arc<dyn Update<E>>,
    actor: Actor<By>,
}

impl<E: Entity, By> SoftDelete<E, By> {
    pub fn new(inner: Arc<dyn Update<E>>, actor: Actor<By>) -> Self {
        Self { inner, actor }
    }
}

fn stamp_deleted<E: HasDeletedMeta<By>, By>(entity: &mut E, actor: &Actor<By>) -> Result<()> {
    require_id(entity, "delete")?;
    entity.set_deleted_on(Some(Utc::now()));
    entity.set_deleted_by(Some(actor()));
    Ok(())
}

#[async_trait]
impl<E, By> Delete<E> for SoftDelete<E, By>
where
    E: HasDeletedMeta<By>,
    By: Send + Sync + 'static,
{
    async fn delete(&self, mut entity: E, ct: &CancellationToken) -> Result<E> {
        stamp_deleted(&mut entity, &self.actor)?;
        self.inner.update(entity, ct).await
    }
}

pub struct SoftDeleteRange<E: Entity, By = String> {
    inner: Arc<dyn UpdateRange<E>>,
    actor: Actor<By>,
}

impl<E: Entity, By> SoftDeleteRange<E, By> {
    pub fn new(inner: Arc<dyn UpdateRange<E>>, actor: Actor<By>) -> Self {
        Self { inner, actor }
    }
}

#[async_trait]
impl<E, By> DeleteRange<E> for SoftDeleteRange<E, By>
where
    E: HasDeletedMeta<By>,
    By: Send + Sync + 'static,
{
    async fn delete_range(&self, mut entities: Vec<E>, ct: &CancellationToken) -> Result<Vec<E>> {
        for entity in entities.iter_mut() {
            stamp_deleted(entity, &self.actor)?;
        }
        self.inner.update_range(entities, ct).await
    }
}
