//! PostgreSQL sessions
//!
//! A session holds at most one pooled connection at a time. An explicit
//! transaction is a sqlx [`Transaction`] begun on the pool; outside one the
//! session keeps a plain pooled connection. Every flushed batch runs in a
//! nested sqlx transaction: its own `BEGIN` outside an explicit transaction,
//! a savepoint inside one. A batch future dropped part way through is rolled
//! back by sqlx, never committed by a later batch.

use std::any::Any;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Connection, Postgres, Transaction};
use tracing::{debug, info, warn};
use unitwork_common::{Error, Result, StoreError};
use unitwork_contracts::{EntityMeta, QuerySpec};
use unitwork_core::{Change, ChangeKind, Session, SessionProvider};

use crate::sql;

/// Translate a driver error, recognising unique violations
pub fn map_db_error(err: sqlx::Error, table: &str) -> Error {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::UniqueViolation {
                table: db_err.table().unwrap_or(table).to_string(),
                constraint: db_err.constraint().unwrap_or("unique").to_string(),
            }
            .into();
        }
    }
    Error::from(err)
}

pub struct PgSession {
    pool: PgPool,
    conn: Option<PoolConnection<Postgres>>,
    tx: Option<Transaction<'static, Postgres>>,
    closed: bool,
}

impl std::fmt::Debug for PgSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSession")
            .field("connected", &(self.conn.is_some() || self.tx.is_some()))
            .field("in_transaction", &self.tx.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

impl PgSession {
    pub fn new(pool: PgPool, conn: PoolConnection<Postgres>) -> Self {
        Self {
            pool,
            conn: Some(conn),
            tx: None,
            closed: false,
        }
    }

    /// The live connection, inside the open transaction if there is one
    pub async fn connection(&mut self) -> Result<&mut PgConnection> {
        if self.closed {
            return Err(StoreError::SessionClosed.into());
        }
        if let Some(tx) = self.tx.as_mut() {
            return Ok(&mut **tx);
        }
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.pool.acquire().await?,
        };
        Ok(&mut **self.conn.insert(conn))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StoreError::SessionClosed.into());
        }
        Ok(())
    }
}

async fn apply_one(conn: &mut PgConnection, change: &Change) -> Result<()> {
    let statement = match change.kind {
        ChangeKind::Insert => sql::insert(&change.meta)?,
        ChangeKind::Update => sql::update(&change.meta, &change.row)?,
        ChangeKind::Delete => sql::delete(&change.meta)?,
    };
    let result = sqlx::query(&statement)
        .bind(&change.row)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_db_error(e, change.meta.table))?;
    if change.kind != ChangeKind::Insert && result.rows_affected() == 0 {
        return Err(StoreError::RowNotFound {
            table: change.meta.table.to_string(),
            key: change.key.clone(),
        }
        .into());
    }
    Ok(())
}

async fn apply_all(conn: &mut PgConnection, changes: &[Change]) -> Result<()> {
    for change in changes {
        apply_one(conn, change).await?;
    }
    Ok(())
}

#[async_trait]
impl Session for PgSession {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn next_sequence(&mut self, meta: &EntityMeta) -> Result<i64> {
        let table = sql::quote(meta.table)?;
        let next: Option<i64> =
            sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence($1, $2))")
                .bind(table)
                .bind(meta.id_column)
                .fetch_one(self.connection().await?)
                .await?;
        next.ok_or_else(|| {
            Error::InvalidArgument(format!(
                "{}.{} has no identity sequence; assign ids explicitly",
                meta.table, meta.id_column
            ))
        })
    }

    async fn fetch(&mut self, meta: &EntityMeta, spec: &QuerySpec) -> Result<Vec<Value>> {
        let mut qb = sql::select(meta, spec)?;
        let rows = qb
            .build_query_scalar::<Value>()
            .fetch_all(self.connection().await?)
            .await?;
        Ok(rows)
    }

    async fn count(&mut self, meta: &EntityMeta, spec: &QuerySpec) -> Result<u64> {
        let mut qb = sql::count(meta, spec)?;
        let found: i64 = qb
            .build_query_scalar::<i64>()
            .fetch_one(self.connection().await?)
            .await?;
        Ok(u64::try_from(found).unwrap_or(0))
    }

    async fn apply(&mut self, changes: &[Change]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut batch = self.connection().await?.begin().await?;
        match apply_all(&mut *batch, changes).await {
            Ok(()) => {
                batch.commit().await?;
                debug!(changes = changes.len(), "Applied batch");
                Ok(())
            }
            Err(e) => {
                if let Err(undo_err) = batch.rollback().await {
                    warn!(error = %undo_err, "Failed to undo partial batch");
                }
                Err(e)
            }
        }
    }

    async fn begin(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.tx.is_some() {
            return Err(Error::IllegalState(
                "postgres session already has an open transaction".to_string(),
            ));
        }
        self.conn = None;
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        let tx = self.tx.take().ok_or_else(|| {
            Error::IllegalState("postgres session has no open transaction".to_string())
        })?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(tx) = self.tx.take() {
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "Rollback on close failed");
            }
        }
        self.conn = None;
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Opens one pooled connection per session
#[derive(Clone, Debug)]
pub struct PgSessionProvider {
    pool: PgPool,
}

impl PgSessionProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool to `database_url`
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SessionProvider for PgSessionProvider {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn open(&self) -> Result<Box<dyn Session>> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PgSession::new(self.pool.clone(), conn)))
    }
}
