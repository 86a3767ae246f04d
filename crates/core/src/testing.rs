//! Recording session used by unit tests in this crate

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use unitwork_common::{ContainerOptions, Result, StoreError};
use unitwork_contracts::{Entity, EntityMeta, Filter, QuerySpec};

use crate::container::SessionContainer;
use crate::session::{Change, ChangeKind, Session, SessionProvider};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: i64,
    pub code: String,
}

impl Entity for Widget {
    type Id = i64;
    const TABLE: &'static str = "widgets";

    fn id(&self) -> &i64 {
        &self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    NextSequence,
    Fetch,
    Count,
    Apply(usize),
    Begin,
    Commit,
    Rollback,
    Close,
}

#[derive(Default)]
struct LogState {
    calls: Vec<Call>,
    rows: BTreeMap<(String, String), Value>,
    sequence: i64,
    fail_next_apply: bool,
    stall_next_apply: bool,
    fail_next_rollback: bool,
}

/// Shared view of what the recording session did
#[derive(Clone, Default)]
pub struct CallLog {
    state: Arc<Mutex<LogState>>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn seed(&self, table: &str, row: Value) {
        let key = row["id"].to_string();
        self.state
            .lock()
            .unwrap()
            .rows
            .insert((table.to_string(), key), row);
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .rows
            .keys()
            .filter(|(t, _)| t == table)
            .count()
    }

    pub fn fail_next_apply(&self) {
        self.state.lock().unwrap().fail_next_apply = true;
    }

    /// The next apply never completes; the caller has to cancel it
    pub fn stall_next_apply(&self) {
        self.state.lock().unwrap().stall_next_apply = true;
    }

    pub fn fail_next_rollback(&self) {
        self.state.lock().unwrap().fail_next_rollback = true;
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

/// Writes straight into the shared log; transactions are only flagged
pub struct RecordingSession {
    log: CallLog,
    in_transaction: bool,
}

fn matches(filters: &[Filter], row: &Value) -> bool {
    filters.iter().all(|filter| match filter {
        Filter::Compare { column, op, value } => value
            .compare_json(&row[column.as_str()])
            .is_some_and(|ordering| op.accepts(ordering)),
        Filter::In { column, values } => values
            .iter()
            .any(|v| v.compare_json(&row[column.as_str()]) == Some(std::cmp::Ordering::Equal)),
        Filter::IsNull { column, negated } => row[column.as_str()].is_null() != *negated,
    })
}

#[async_trait]
impl Session for RecordingSession {
    fn backend(&self) -> &'static str {
        "recording"
    }

    async fn next_sequence(&mut self, _meta: &EntityMeta) -> Result<i64> {
        self.log.record(Call::NextSequence);
        let mut state = self.log.state.lock().unwrap();
        state.sequence += 1;
        Ok(state.sequence)
    }

    async fn fetch(&mut self, meta: &EntityMeta, spec: &QuerySpec) -> Result<Vec<Value>> {
        self.log.record(Call::Fetch);
        let state = self.log.state.lock().unwrap();
        let limit = spec.limit.unwrap_or(u64::MAX) as usize;
        Ok(state
            .rows
            .iter()
            .filter(|((table, _), row)| table == meta.table && matches(&spec.filters, row))
            .map(|(_, row)| row.clone())
            .take(limit)
            .collect())
    }

    async fn count(&mut self, meta: &EntityMeta, spec: &QuerySpec) -> Result<u64> {
        self.log.record(Call::Count);
        let state = self.log.state.lock().unwrap();
        let found = state
            .rows
            .iter()
            .filter(|((table, _), row)| table == meta.table && matches(&spec.filters, row))
            .count() as u64;
        Ok(found.min(spec.limit.unwrap_or(u64::MAX)))
    }

    async fn apply(&mut self, changes: &[Change]) -> Result<()> {
        self.log.record(Call::Apply(changes.len()));
        let stalled = std::mem::take(&mut self.log.state.lock().unwrap().stall_next_apply);
        if stalled {
            std::future::pending::<()>().await;
        }
        let mut state = self.log.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_apply) {
            return Err(StoreError::RowNotFound {
                table: "widgets".to_string(),
                key: "injected".to_string(),
            }
            .into());
        }
        for change in changes {
            let key = (change.meta.table.to_string(), change.key.clone());
            match change.kind {
                ChangeKind::Insert | ChangeKind::Update => {
                    state.rows.insert(key, change.row.clone());
                }
                ChangeKind::Delete => {
                    state.rows.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        self.log.record(Call::Begin);
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.log.record(Call::Commit);
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.log.record(Call::Rollback);
        if std::mem::take(&mut self.log.state.lock().unwrap().fail_next_rollback) {
            return Err(StoreError::SessionClosed.into());
        }
        self.in_transaction = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn close(&mut self) -> Result<()> {
        self.log.record(Call::Close);
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Provider handing out recording sessions over one shared log
#[derive(Clone, Default)]
pub struct RecordingProvider {
    pub log: CallLog,
}

#[async_trait]
impl SessionProvider for RecordingProvider {
    fn backend(&self) -> &'static str {
        "recording"
    }

    async fn open(&self) -> Result<Box<dyn Session>> {
        Ok(Box::new(RecordingSession {
            log: self.log.clone(),
            in_transaction: false,
        }))
    }
}

pub fn recording_container(options: ContainerOptions) -> (SessionContainer, CallLog) {
    let log = CallLog::default();
    let session = RecordingSession {
        log: log.clone(),
        in_transaction: false,
    };
    (SessionContainer::new(Box::new(session), options), log)
}
