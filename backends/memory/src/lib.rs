//! In-memory session backend for Unitwork
//!
//! A process-local store with per-session transactions, unique key
//! enforcement and identity sequences. Suited to tests and local runs.

pub mod eval;
pub mod session;
pub mod store;

pub use session::MemorySession;
pub use store::{MemoryStore, Table};
