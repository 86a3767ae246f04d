//! PostgreSQL session backend for Unitwork
//!
//! Maps entities to tables through `jsonb`, so any serde entity whose fields
//! match its table's columns can be stored without per-type SQL.

pub mod session;
pub mod sql;

pub use session::{map_db_error, PgSession, PgSessionProvider};
