//! Change tracking and identity resolution
//!
//! The tracker keeps the ordered log of writes queued since the last flush and
//! an identity map of rows the session knows about. Tracked reads resolve
//! fetched rows through the identity map so the session hands out the
//! version it already holds.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;
use unitwork_common::Result;
use unitwork_contracts::EntityMeta;

use crate::session::{row_key, Change, ChangeKind};

type IdentityKey = (&'static str, String);

#[derive(Debug, Default)]
pub struct ChangeTracker {
    pending: Vec<Change>,
    identity: HashMap<IdentityKey, Value>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a change and record the row in the identity map
    pub fn track(&mut self, kind: ChangeKind, meta: EntityMeta, row: Value) -> Result<()> {
        let change = Change::new(kind, meta, row)?;
        let key = (meta.table, change.key.clone());
        match kind {
            ChangeKind::Delete => {
                self.identity.remove(&key);
            }
            ChangeKind::Insert | ChangeKind::Update => {
                self.identity.insert(key, change.row.clone());
            }
        }
        debug!(
            table = meta.table,
            key = %change.key,
            kind = %kind,
            "Tracked change"
        );
        self.pending.push(change);
        Ok(())
    }

    pub fn pending(&self) -> &[Change] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drain the pending log for a flush
    pub fn take_pending(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.pending)
    }

    /// Drop changes queued after `mark` and restore the identity map entries
    /// they touched from what is still queued
    pub fn rollback_to(&mut self, mark: usize) {
        if mark >= self.pending.len() {
            return;
        }
        let dropped = self.pending.split_off(mark);
        let touched: Vec<IdentityKey> = dropped
            .iter()
            .map(|change| (change.meta.table, change.key.clone()))
            .collect();
        for key in &touched {
            self.identity.remove(key);
        }
        for change in &self.pending {
            let key = (change.meta.table, change.key.clone());
            if !touched.contains(&key) {
                continue;
            }
            match change.kind {
                ChangeKind::Delete => {
                    self.identity.remove(&key);
                }
                ChangeKind::Insert | ChangeKind::Update => {
                    self.identity.insert(key, change.row.clone());
                }
            }
        }
        debug!(discarded = dropped.len(), "Rolled back queued changes");
    }

    /// Resolve fetched rows against the identity map, registering new ones
    pub fn resolve(&mut self, meta: &EntityMeta, rows: Vec<Value>) -> Result<Vec<Value>> {
        rows.into_iter()
            .map(|row| {
                let key = (meta.table, row_key(meta, &row)?);
                Ok(self.identity.entry(key).or_insert(row).clone())
            })
            .collect()
    }

    pub fn tracked_count(&self) -> usize {
        self.identity.len()
    }

    /// Discard pending changes and tracked rows
    pub fn clear(&mut self) {
        self.pending.clear();
        self.identity.clear();
    }
}
