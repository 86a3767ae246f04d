//! Shared in-memory store
//!
//! Tables are ordered maps from canonical row key to JSON row. Every batch is
//! applied to copies of the touched tables and swapped in only when all of
//! its changes succeed, so a failed batch leaves the store untouched.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;
use unitwork_common::{Result, StoreError};
use unitwork_contracts::{EntityMeta, QuerySpec};
use unitwork_core::{Change, ChangeKind};

use crate::eval;

#[derive(Debug, Clone, Default)]
pub struct Table {
    rows: BTreeMap<String, Value>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &Value> {
        self.rows.values()
    }

    /// Apply one change, enforcing the primary key and unique keys
    pub fn apply(&mut self, change: &Change) -> Result<()> {
        let table = change.meta.table;
        match change.kind {
            ChangeKind::Insert => {
                if self.rows.contains_key(&change.key) {
                    return Err(StoreError::unique_violation(table, &[change.meta.id_column]).into());
                }
                self.check_unique(change)?;
                self.rows.insert(change.key.clone(), change.row.clone());
            }
            ChangeKind::Update => {
                if !self.rows.contains_key(&change.key) {
                    return Err(row_not_found(change));
                }
                self.check_unique(change)?;
                self.rows.insert(change.key.clone(), change.row.clone());
            }
            ChangeKind::Delete => {
                if self.rows.remove(&change.key).is_none() {
                    return Err(row_not_found(change));
                }
            }
        }
        Ok(())
    }

    fn check_unique(&self, change: &Change) -> Result<()> {
        for columns in change.meta.unique_keys {
            let candidate: Vec<&Value> = columns
                .iter()
                .map(|c| change.row.get(*c).unwrap_or(&Value::Null))
                .collect();
            if candidate.iter().any(|v| v.is_null()) {
                continue;
            }
            let clash = self.rows.iter().any(|(key, row)| {
                key != &change.key
                    && columns
                        .iter()
                        .zip(&candidate)
                        .all(|(c, v)| row.get(*c) == Some(*v))
            });
            if clash {
                return Err(StoreError::unique_violation(change.meta.table, columns).into());
            }
        }
        Ok(())
    }
}

fn row_not_found(change: &Change) -> unitwork_common::Error {
    StoreError::RowNotFound {
        table: change.meta.table.to_string(),
        key: change.key.clone(),
    }
    .into()
}

/// Apply `changes` to copies of the tables they touch. `lookup` supplies the
/// current version of a table that has no copy yet.
pub(crate) fn apply_batch<'a>(
    changes: &[Change],
    mut lookup: impl FnMut(&'static str) -> Option<&'a Table>,
) -> Result<HashMap<&'static str, Table>> {
    let mut staged: HashMap<&'static str, Table> = HashMap::new();
    for change in changes {
        let table = staged
            .entry(change.meta.table)
            .or_insert_with(|| lookup(change.meta.table).cloned().unwrap_or_default());
        table.apply(change)?;
    }
    Ok(staged)
}

#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) tables: HashMap<&'static str, Table>,
    sequences: HashMap<&'static str, i64>,
}

impl StoreState {
    /// Keep identity sequences ahead of explicitly chosen integer ids
    pub(crate) fn observe_ids(&mut self, changes: &[Change]) {
        for change in changes {
            if change.kind != ChangeKind::Insert {
                continue;
            }
            if let Some(id) = change.row.get(change.meta.id_column).and_then(Value::as_i64) {
                let sequence = self.sequences.entry(change.meta.table).or_insert(0);
                *sequence = (*sequence).max(id);
            }
        }
    }
}

/// Process-local store shared by every session it opens
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub(crate) state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next identity value for the table. Sequences are not transactional:
    /// a value drawn inside a rolled back transaction is never reissued.
    pub fn next_sequence(&self, meta: &EntityMeta) -> i64 {
        let mut state = self.state.lock();
        let sequence = state.sequences.entry(meta.table).or_insert(0);
        *sequence += 1;
        *sequence
    }

    /// Committed rows matching the query
    pub fn select(&self, table: &str, spec: &QuerySpec) -> Vec<Value> {
        let state = self.state.lock();
        match state.tables.get(table) {
            Some(t) => eval::select(t.rows(), spec),
            None => Vec::new(),
        }
    }

    pub fn count(&self, table: &str, spec: &QuerySpec) -> u64 {
        let state = self.state.lock();
        state
            .tables
            .get(table)
            .map_or(0, |t| eval::count(t.rows(), spec))
    }

    /// Apply a batch atomically to the committed state
    pub fn apply(&self, changes: &[Change]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock();
        let staged = apply_batch(changes, |name| state.tables.get(name))?;
        state.tables.extend(staged);
        state.observe_ids(changes);
        debug!(changes = changes.len(), "Applied batch to memory store");
        Ok(())
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state.lock().tables.get(table).map_or(0, Table::len)
    }

    /// Drop every table and sequence
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.tables.clear();
        state.sequences.clear();
    }
}
