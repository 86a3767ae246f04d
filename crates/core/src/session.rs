//! Session backend contract
//!
//! A [`Session`] is the opaque persistence capability one session container
//! owns: one store connection able to read rows, write a batch of changes
//! atomically and run one transaction at a time. Entity mapping and change
//! tracking happen above it, so backends only ever see JSON rows.

use std::any::Any;

use async_trait::async_trait;
use serde_json::Value;
use unitwork_common::{Error, Result};
use unitwork_contracts::{EntityMeta, QuerySpec};

/// Kind of a pending change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One pending write, queued by the change tracker and applied on flush
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub kind: ChangeKind,
    pub meta: EntityMeta,
    /// Canonical row key, the JSON text of the id column
    pub key: String,
    /// Full row as a JSON object keyed by column
    pub row: Value,
}

impl Change {
    pub fn new(kind: ChangeKind, meta: EntityMeta, row: Value) -> Result<Self> {
        let key = row_key(&meta, &row)?;
        Ok(Self {
            kind,
            meta,
            key,
            row,
        })
    }
}

/// Canonical key of a row: the JSON text of its id column
pub fn row_key(meta: &EntityMeta, row: &Value) -> Result<String> {
    let object = row.as_object().ok_or_else(|| {
        Error::InvalidArgument(format!("{} must serialize to a JSON object", meta.entity))
    })?;
    match object.get(meta.id_column) {
        Some(Value::Null) | None => Err(Error::InvalidArgument(format!(
            "{} row has no '{}' column",
            meta.entity, meta.id_column
        ))),
        Some(id) => Ok(id.to_string()),
    }
}

/// The persistence capability owned by one session container
#[async_trait]
pub trait Session: Send + 'static {
    /// Short backend name used in logs
    fn backend(&self) -> &'static str;

    /// Draw the next value of the table's identity sequence
    async fn next_sequence(&mut self, meta: &EntityMeta) -> Result<i64>;

    /// Rows matching the query, as JSON objects keyed by column
    async fn fetch(&mut self, meta: &EntityMeta, spec: &QuerySpec) -> Result<Vec<Value>>;

    /// Number of rows matching the query, honouring offset and limit
    async fn count(&mut self, meta: &EntityMeta, spec: &QuerySpec) -> Result<u64>;

    /// Write a batch of changes, all or nothing
    async fn apply(&mut self, changes: &[Change]) -> Result<()>;

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    fn in_transaction(&self) -> bool;

    /// Release the underlying connection, aborting any open transaction
    async fn close(&mut self) -> Result<()>;

    /// Access to the concrete backend for backend-native work
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Opens one session per unit-of-work scope
#[async_trait]
pub trait SessionProvider: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn open(&self) -> Result<Box<dyn Session>>;
}
