//! Session container
//!
//! Owns exactly one backend session and serializes all access to it. Every
//! read, write, flush and transaction step runs under the container's lock,
//! so concurrent callers sharing a container take turns instead of
//! interleaving on the underlying connection.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use unitwork_common::{ContainerOptions, Error, Result, StoreError};
use unitwork_contracts::{Entity, EntityId, EntityMeta, Query, QuerySource, QuerySpec};

use crate::session::{ChangeKind, Session};
use crate::tracker::ChangeTracker;

/// State guarded by the container lock and handed to aggregators and
/// executors for the duration of their call
pub struct SessionContext {
    session: Option<Box<dyn Session>>,
    tracker: ChangeTracker,
    no_tracking: bool,
    /// Pending log length when the running executor started
    call_mark: Option<usize>,
}

impl SessionContext {
    fn new(session: Box<dyn Session>, options: ContainerOptions) -> Self {
        Self {
            session: Some(session),
            tracker: ChangeTracker::new(),
            no_tracking: options.no_tracking,
            call_mark: None,
        }
    }

    /// The live backend session
    pub fn backend_mut(&mut self) -> Result<&mut dyn Session> {
        match self.session.as_mut() {
            Some(session) => Ok(session.as_mut()),
            None => Err(StoreError::SessionClosed.into()),
        }
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn pending_changes(&self) -> usize {
        self.tracker.pending().len()
    }

    /// Queue an insert, assigning the identity first when it is still empty
    pub async fn add<E: Entity>(&mut self, mut entity: E) -> Result<E> {
        let meta = E::meta();
        if entity.id().is_unassigned() {
            let id = match E::Id::generate() {
                Some(id) => id,
                None => {
                    let next = self.backend_mut()?.next_sequence(&meta).await?;
                    E::Id::from_sequence(next).ok_or_else(|| {
                        Error::InvalidArgument(format!(
                            "cannot derive a {} id from sequence value {}",
                            meta.entity, next
                        ))
                    })?
                }
            };
            entity.set_id(id);
        }
        let row = serde_json::to_value(&entity)?;
        self.tracker.track(ChangeKind::Insert, meta, row)?;
        Ok(entity)
    }

    /// Queue a full replace of an existing row
    pub fn update<E: Entity>(&mut self, entity: E) -> Result<E> {
        self.track_existing(ChangeKind::Update, entity)
    }

    /// Queue removal of an existing row
    pub fn remove<E: Entity>(&mut self, entity: E) -> Result<E> {
        self.track_existing(ChangeKind::Delete, entity)
    }

    fn track_existing<E: Entity>(&mut self, kind: ChangeKind, entity: E) -> Result<E> {
        let meta = E::meta();
        if entity.id().is_unassigned() {
            return Err(Error::InvalidArgument(format!(
                "cannot {} a {} without an id",
                kind, meta.entity
            )));
        }
        let row = serde_json::to_value(&entity)?;
        self.tracker.track(kind, meta, row)?;
        Ok(entity)
    }

    /// Typed read through the session
    pub async fn fetch<E: Entity>(&mut self, spec: QuerySpec) -> Result<Vec<E>> {
        spec.validate()?;
        let rows = self.fetch_rows(&E::meta(), &spec).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(Error::from))
            .collect()
    }

    pub async fn count<E: Entity>(&mut self, spec: QuerySpec) -> Result<u64> {
        spec.validate()?;
        self.count_rows(&E::meta(), &spec).await
    }

    async fn fetch_rows(&mut self, meta: &EntityMeta, spec: &QuerySpec) -> Result<Vec<Value>> {
        if spec.is_trivially_empty() {
            return Ok(Vec::new());
        }
        let rows = self.backend_mut()?.fetch(meta, spec).await?;
        if spec.tracking.unwrap_or(!self.no_tracking) {
            self.tracker.resolve(meta, rows)
        } else {
            Ok(rows)
        }
    }

    async fn count_rows(&mut self, meta: &EntityMeta, spec: &QuerySpec) -> Result<u64> {
        if spec.is_trivially_empty() {
            return Ok(0);
        }
        self.backend_mut()?.count(meta, spec).await
    }

    /// Write every pending change to the store in one batch.
    ///
    /// The batch stays queued until the store has answered. A rejected batch
    /// is dropped and the store is left as it was.
    pub async fn flush(&mut self) -> Result<usize> {
        self.write_pending(false).await
    }

    /// Like [`flush`](Self::flush), but a rejected batch stays queued
    async fn flush_retaining(&mut self) -> Result<usize> {
        self.write_pending(true).await
    }

    async fn write_pending(&mut self, retain_on_failure: bool) -> Result<usize> {
        if !self.tracker.has_pending() {
            return Ok(0);
        }
        let session = match self.session.as_mut() {
            Some(session) => session,
            None => return Err(StoreError::SessionClosed.into()),
        };
        let changes = self.tracker.pending().len();
        match session.apply(self.tracker.pending()).await {
            Ok(()) => {
                self.tracker.take_pending();
                debug!(changes, backend = session.backend(), "Flushed changes");
                Ok(changes)
            }
            Err(e) if retain_on_failure => {
                warn!(changes, error = %e, "Flush failed, batch kept");
                Err(e)
            }
            Err(e) => {
                self.tracker.clear();
                warn!(changes, error = %e, "Flush failed, batch discarded");
                Err(e)
            }
        }
    }

    fn start_call(&mut self) {
        self.call_mark = Some(self.tracker.pending().len());
    }

    /// Close the executor call; changes queued by a failed call are dropped
    fn finish_call<R>(&mut self, result: Result<R>) -> Result<R> {
        let mark = self.call_mark.take();
        if let (Err(e), Some(mark)) = (&result, mark) {
            if self.tracker.pending().len() > mark {
                debug!(error = %e, "Executor failed, dropping its queued changes");
            }
            self.tracker.rollback_to(mark);
        }
        result
    }

    fn discard_pending(&mut self) {
        self.call_mark = None;
        self.tracker.clear();
    }
}

struct Inner {
    state: Mutex<SessionContext>,
    options: ContainerOptions,
    backend: &'static str,
    abandoned: AtomicBool,
}

/// Exclusive owner of one backend session
#[derive(Clone)]
pub struct SessionContainer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContainer")
            .field("backend", &self.inner.backend)
            .field("options", &self.inner.options)
            .finish()
    }
}

impl SessionContainer {
    pub fn new(session: Box<dyn Session>, options: ContainerOptions) -> Self {
        let backend = session.backend();
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionContext::new(session, options)),
                options,
                backend,
                abandoned: AtomicBool::new(false),
            }),
        }
    }

    pub fn options(&self) -> ContainerOptions {
        self.inner.options
    }

    pub fn backend(&self) -> &'static str {
        self.inner.backend
    }

    /// Lazy read sequence over all rows of `E`
    pub fn query<E: Entity>(&self) -> Query<E> {
        Query::new(Arc::new(self.clone()))
    }

    /// Run a read-only function against the session
    pub async fn aggregate<P, R, F>(&self, aggregator: F, param: P, ct: &CancellationToken) -> Result<R>
    where
        F: for<'s> FnOnce(&'s mut SessionContext, P) -> BoxFuture<'s, Result<R>> + Send,
        P: Send,
        R: Send,
    {
        guarded(ct, async {
            let mut ctx = self.lock().await?;
            aggregator(&mut *ctx, param).await
        })
        .await
    }

    /// Run a mutating function against the session, flushing afterwards when
    /// auto-save is on
    pub async fn execute<P, R, F>(&self, executor: F, param: P, ct: &CancellationToken) -> Result<R>
    where
        F: for<'s> FnOnce(&'s mut SessionContext, P) -> BoxFuture<'s, Result<R>> + Send,
        P: Send,
        R: Send,
    {
        let auto_save = self.inner.options.auto_save_changes;
        guarded(ct, async {
            let mut ctx = self.lock().await?;
            ctx.start_call();
            let result = executor(&mut *ctx, param).await;
            let result = ctx.finish_call(result)?;
            if auto_save {
                ctx.flush().await?;
            }
            Ok(result)
        })
        .await
    }

    /// Variant of [`aggregate`](Self::aggregate) for functions without a parameter
    pub async fn aggregate_with<R, F>(&self, aggregator: F, ct: &CancellationToken) -> Result<R>
    where
        F: for<'s> FnOnce(&'s mut SessionContext) -> BoxFuture<'s, Result<R>> + Send,
        R: Send,
    {
        guarded(ct, async {
            let mut ctx = self.lock().await?;
            aggregator(&mut *ctx).await
        })
        .await
    }

    /// Variant of [`execute`](Self::execute) for functions without a parameter
    pub async fn execute_with<R, F>(&self, executor: F, ct: &CancellationToken) -> Result<R>
    where
        F: for<'s> FnOnce(&'s mut SessionContext) -> BoxFuture<'s, Result<R>> + Send,
        R: Send,
    {
        let auto_save = self.inner.options.auto_save_changes;
        guarded(ct, async {
            let mut ctx = self.lock().await?;
            ctx.start_call();
            let result = executor(&mut *ctx).await;
            let result = ctx.finish_call(result)?;
            if auto_save {
                ctx.flush().await?;
            }
            Ok(result)
        })
        .await
    }

    /// Flush pending changes; returns how many were written
    pub async fn save_changes(&self, ct: &CancellationToken) -> Result<usize> {
        guarded(ct, async {
            let mut ctx = self.lock().await?;
            ctx.flush().await
        })
        .await
    }

    pub(crate) async fn begin_transaction(&self, ct: &CancellationToken) -> Result<()> {
        guarded(ct, async {
            let mut ctx = self.lock().await?;
            let session = ctx.backend_mut()?;
            if session.in_transaction() {
                return Err(Error::IllegalState(
                    "Session already has an open transaction".to_string(),
                ));
            }
            session.begin().await?;
            info!(backend = session.backend(), "Transaction started");
            Ok(())
        })
        .await
    }

    pub(crate) async fn commit_transaction(&self, ct: &CancellationToken) -> Result<()> {
        guarded(ct, async {
            let mut ctx = self.lock().await?;
            ctx.flush_retaining().await?;
            let session = ctx.backend_mut()?;
            session.commit().await?;
            info!(backend = session.backend(), "Transaction committed");
            Ok(())
        })
        .await
    }

    pub(crate) async fn rollback_transaction(&self, ct: &CancellationToken) -> Result<()> {
        guarded(ct, async {
            let mut ctx = self.lock().await?;
            ctx.discard_pending();
            let session = ctx.backend_mut()?;
            session.rollback().await?;
            info!(backend = session.backend(), "Transaction rolled back");
            Ok(())
        })
        .await
    }

    /// Schedule a rollback for the next time the session is used
    pub(crate) fn mark_abandoned(&self) {
        self.inner.abandoned.store(true, Ordering::Release);
    }

    pub async fn in_transaction(&self) -> bool {
        let ctx = self.inner.state.lock().await;
        ctx.session.as_ref().is_some_and(|s| s.in_transaction())
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.state.lock().await.session.is_none()
    }

    /// Release the session. Pending changes are discarded and an open
    /// transaction is rolled back. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let mut ctx = self.inner.state.lock().await;
        self.inner.abandoned.store(false, Ordering::Release);
        ctx.discard_pending();
        let Some(mut session) = ctx.session.take() else {
            return Ok(());
        };
        if session.in_transaction() {
            if let Err(e) = session.rollback().await {
                warn!(error = %e, "Rollback on close failed");
            }
        }
        session.close().await?;
        debug!(backend = self.inner.backend, "Session closed");
        Ok(())
    }

    /// Best-effort close from synchronous code. Drops the session without
    /// awaiting; backends abort open transactions when their session drops.
    #[mutants::skip]
    pub fn close_detached(&self) {
        match self.inner.state.try_lock() {
            Ok(mut ctx) => {
                ctx.discard_pending();
                if let Some(session) = ctx.session.take() {
                    debug!(backend = session.backend(), "Session dropped without close");
                }
            }
            Err(_) => {
                self.mark_abandoned();
                warn!(backend = self.inner.backend, "Session busy, close deferred to drop");
            }
        }
    }

    async fn lock(&self) -> Result<MutexGuard<'_, SessionContext>> {
        let mut ctx = self.inner.state.lock().await;
        if let Some(mark) = ctx.call_mark.take() {
            debug!(backend = self.inner.backend, "Dropping changes of an interrupted call");
            ctx.tracker.rollback_to(mark);
        }
        if self.inner.abandoned.load(Ordering::Acquire) {
            ctx.discard_pending();
            if let Some(session) = ctx.session.as_mut() {
                if session.in_transaction() {
                    warn!(backend = session.backend(), "Rolling back abandoned transaction");
                    session.rollback().await?;
                }
            }
            self.inner.abandoned.store(false, Ordering::Release);
        }
        if ctx.session.is_none() {
            return Err(StoreError::SessionClosed.into());
        }
        Ok(ctx)
    }
}

#[async_trait]
impl QuerySource for SessionContainer {
    async fn fetch_rows(
        &self,
        meta: EntityMeta,
        spec: QuerySpec,
        ct: &CancellationToken,
    ) -> Result<Vec<Value>> {
        guarded(ct, async {
            let mut ctx = self.lock().await?;
            ctx.fetch_rows(&meta, &spec).await
        })
        .await
    }

    async fn count_rows(
        &self,
        meta: EntityMeta,
        spec: QuerySpec,
        ct: &CancellationToken,
    ) -> Result<u64> {
        guarded(ct, async {
            let mut ctx = self.lock().await?;
            ctx.count_rows(&meta, &spec).await
        })
        .await
    }
}

/// Race `fut` against cancellation
pub(crate) async fn guarded<T>(
    ct: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    if ct.is_cancelled() {
        return Err(Error::Cancelled);
    }
    tokio::select! {
        biased;
        _ = ct.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}
