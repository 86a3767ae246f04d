//! Shared configuration and error handling for Unitwork
//!
//! This crate provides common functionality used across the Unitwork crates:
//! - Session container options and application configuration
//! - The error taxonomy surfaced by every unit-of-work operation
//! - Store failure types reported by session backends

pub mod config;
pub mod db;
pub mod error;

pub use config::{Config, ContainerOptions};
pub use db::StoreError;
pub use error::{Error, Result};
