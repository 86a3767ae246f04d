//! Audit-stamping decorators
//!
//! Wrap another create or update strategy and stamp the audit columns before
//! delegating. The actor is supplied by a callback so it can follow whatever
//! request context the caller has.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use unitwork_common::Result;
use unitwork_contracts::{
    Create, CreateRange, Entity, HasCreatedMeta, HasUpdatedMeta, Update, UpdateRange,
};

use super::require_id;

/// Supplies the identity recorded in audit columns
pub type Actor<By = String> = Arc<dyn Fn() -> By + Send + Sync>;

pub struct AuditedCreate<E: Entity, By = String> {
    inner: Arc<dyn Create<E>>,
    actor: Actor<By>,
}

impl<E: Entity, By> AuditedCreate<E, By> {
    pub fn new(inner: Arc<dyn Create<E>>, actor: Actor<By>) -> Self {
        Self { inner, actor }
    }
}

fn stamp_created<E: HasCreatedMeta<By>, By>(entity: &mut E, actor: &Actor<By>) {
    entity.set_created_on(Utc::now());
    entity.set_created_by(actor());
}

fn stamp_updated<E: HasUpdatedMeta<By>, By>(entity: &mut E, actor: &Actor<By>) {
    entity.set_updated_on(Some(Utc::now()));
    entity.set_updated_by(Some(actor()));
}

#[async_trait]
impl<E, By> Create<E> for AuditedCreate<E, By>
where
    E: HasCreatedMeta<By>,
    By: Send + Sync + 'static,
{
    async fn create(&self, mut entity: E, ct: &CancellationToken) -> Result<E> {
        stamp_created(&mut entity, &self.actor);
        self.inner.create(entity, ct).await
    }
}

pub struct AuditedCreateRange<E: Entity, By = String> {
    inner: Arc<dyn CreateRange<E>>,
    actor: Actor<By>,
}

impl<E: Entity, By> AuditedCreateRange<E, By> {
    pub fn new(inner: Arc<dyn CreateRange<E>>, actor: Actor<By>) -> Self {
        Self { inner, actor }
    }
}

#[async_trait]
impl<E, By> CreateRange<E> for AuditedCreateRange<E, By>
where
    E: HasCreatedMeta<By>,
    By: Send + Sync + 'static,
{
    async fn create_range(&self, mut entities: Vec<E>, ct: &CancellationToken) -> Result<Vec<E>> {
        for entity in entities.iter_mut() {
            stamp_created(entity, &self.actor);
        }
        self.inner.create_range(entities, ct).await
    }
}

pub struct AuditedUpdate<E: Entity, By = String> {
    inner: Arc<dyn Update<E>>,
    actor: Actor<By>,
}

impl<E: Entity, By> AuditedUpdate<E, By> {
    pub fn new(inner: Arc<dyn Update<E>>, actor: Actor<By>) -> Self {
        Self { inner, actor }
    }
}

#[async_trait]
impl<E, By> Update<E> for AuditedUpdate<E, By>
where
    E: HasUpdatedMeta<By>,
    By: Send + Sync + 'static,
{
    async fn update(&self, mut entity: E, ct: &CancellationToken) -> Result<E> {
        require_id(&entity, "update")?;
        stamp_updated(&mut entity, &self.actor);
        self.inner.update(entity, ct).await
    }
}

pub struct AuditedUpdateRange<E: Entity, By = String> {
    inner: Arc<dyn UpdateRange<E>>,
    actor: Actor<By>,
}

impl<E: Entity, By> AuditedUpdateRange<E, By> {
    pub fn new(inner: Arc<dyn UpdateRange<E>>, actor: Actor<By>) -> Self {
        Self { inner, actor }
    }
}

#[async_trait]
impl<E, By> UpdateRange<E> for AuditedUpdateRange<E, By>
where
    E: HasUpdatedMeta<By>,
    By: Send + Sync + 'static,
{
    async fn update_range(&self, mut entities: Vec<E>, ct: &CancellationToken) -> Result<Vec<E>> {
        for entity in entities.iter_mut() {
            require_id(entity, "update")?;
            stamp_updated(entity, &self.actor);
        }
        self.inner.update_range(entities, ct).await
    }
}
