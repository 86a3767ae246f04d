//! Memory-backed sessions
//!
//! Outside a transaction a session reads and writes the shared store
//! directly. Inside one it works on private copies of the tables it has
//! written and keeps the batches it applied; commit replays those batches
//! against the shared store as one atomic batch.

use std::any::Any;
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use unitwork_common::{Error, Result, StoreError};
use unitwork_contracts::{EntityMeta, QuerySpec};
use unitwork_core::{Change, Session, SessionProvider};

use crate::eval;
use crate::store::{apply_batch, MemoryStore, Table};

#[derive(Debug, Default)]
struct Overlay {
    tables: HashMap<&'static str, Table>,
    log: Vec<Change>,
}

#[derive(Debug)]
pub struct MemorySession {
    store: MemoryStore,
    transaction: Option<Overlay>,
    closed: bool,
}

impl MemorySession {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            transaction: None,
            closed: false,
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StoreError::SessionClosed.into());
        }
        Ok(())
    }
}

#[async_trait]
impl Session for MemorySession {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn next_sequence(&mut self, meta: &EntityMeta) -> Result<i64> {
        self.ensure_open()?;
        Ok(self.store.next_sequence(meta))
    }

    async fn fetch(&mut self, meta: &EntityMeta, spec: &QuerySpec) -> Result<Vec<Value>> {
        self.ensure_open()?;
        if let Some(table) = self
            .transaction
            .as_ref()
            .and_then(|overlay| overlay.tables.get(meta.table))
        {
            return Ok(eval::select(table.rows(), spec));
        }
        Ok(self.store.select(meta.table, spec))
    }

    async fn count(&mut self, meta: &EntityMeta, spec: &QuerySpec) -> Result<u64> {
        self.ensure_open()?;
        if let Some(table) = self
            .transaction
            .as_ref()
            .and_then(|overlay| overlay.tables.get(meta.table))
        {
            return Ok(eval::count(table.rows(), spec));
        }
        Ok(self.store.count(meta.table, spec))
    }

    async fn apply(&mut self, changes: &[Change]) -> Result<()> {
        self.ensure_open()?;
        let Some(overlay) = self.transaction.as_mut() else {
            return self.store.apply(changes);
        };
        let staged = {
            let committed = self.store.state.lock();
            apply_batch(changes, |name| {
                overlay
                    .tables
                    .get(name)
                    .or_else(|| committed.tables.get(name))
            })?
        };
        overlay.tables.extend(staged);
        overlay.log.extend_from_slice(changes);
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.transaction.is_some() {
            return Err(Error::IllegalState(
                "memory session already has an open transaction".to_string(),
            ));
        }
        self.transaction = Some(Overlay::default());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        let overlay = self.transaction.as_ref().ok_or_else(|| {
            Error::IllegalState("memory session has no open transaction".to_string())
        })?;
        self.store.apply(&overlay.log)?;
        debug!(changes = overlay.log.len(), "Memory transaction committed");
        self.transaction = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        if let Some(overlay) = self.transaction.take() {
            debug!(discarded = overlay.log.len(), "Memory transaction rolled back");
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(overlay) = self.transaction.take() {
            warn!(discarded = overlay.log.len(), "Memory session closed with open transaction");
        }
        self.closed = true;
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[async_trait]
impl SessionProvider for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn open(&self) -> Result<Box<dyn Session>> {
        Ok(Box::new(MemorySession::new(self.clone())))
    }
}
