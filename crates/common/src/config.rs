//! Configuration management following 12-factor app principles
//!
//! Session container options and application settings are loaded from
//! environment variables, with a `.env` file honoured when present.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Options recognised by every session container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerOptions {
    /// Persist pending changes after every mutating execution. Defaults to `true`.
    pub auto_save_changes: bool,

    /// Disable change tracking for queried entities. Defaults to `true`.
    pub no_tracking: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            auto_save_changes: true,
            no_tracking: true,
        }
    }
}

impl ContainerOptions {
    /// Load options from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Ok(Self {
            auto_save_changes: env_flag("UNITWORK_AUTO_SAVE_CHANGES", defaults.auto_save_changes)?,
            no_tracking: env_flag("UNITWORK_NO_TRACKING", defaults.no_tracking)?,
        })
    }

    /// Options with auto-save disabled, for callers that flush once at the end
    pub fn deferred() -> Self {
        Self {
            auto_save_changes: false,
            ..Self::default()
        }
    }
}

/// Application configuration for the composition root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Session backend (`memory` or `postgres`)
    pub backend: String,

    /// Database connection URL, required by the postgres backend
    pub database_url: Option<String>,

    /// Upper bound of pooled connections for the postgres backend
    pub max_connections: u32,

    /// Options applied to every session container
    pub container: ContainerOptions,

    /// Runtime configuration
    pub rust_log: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let backend = env::var("UNITWORK_BACKEND").unwrap_or_else(|_| "memory".to_string());
        let database_url = env::var("DATABASE_URL").ok();

        if backend == "postgres" && database_url.is_none() {
            return Err(anyhow::anyhow!(
                "DATABASE_URL is required for the postgres backend"
            ));
        }

        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("DATABASE_MAX_CONNECTIONS is invalid: {}", e))?;

        Ok(Self {
            backend,
            database_url,
            max_connections,
            container: ContainerOptions::from_env()?,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "unitwork=debug".to_string()),
        })
    }
}

fn env_flag(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => parse_flag(&raw).ok_or_else(|| anyhow::anyhow!("{} must be a boolean", name)),
        Err(_) => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
