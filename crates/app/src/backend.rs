//! Session backend selection
//!
//! The backend is chosen once, from configuration, when the application
//! starts. Everything downstream only sees a [`SessionProvider`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;
use unitwork_common::{Config, Error, Result};
use unitwork_core::SessionProvider;
use unitwork_memory::MemoryStore;
use unitwork_postgres::PgSessionProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Postgres,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Postgres => "postgres",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(BackendKind::Memory),
            "postgres" | "postgresql" | "pg" => Ok(BackendKind::Postgres),
            other => Err(Error::Configuration(format!(
                "Unknown session backend: {}. Supported backends: memory, postgres",
                other
            ))),
        }
    }
}

/// A configured backend
#[derive(Debug, Clone)]
pub enum Backend {
    Memory(MemoryStore),
    Postgres(PgSessionProvider),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Memory(_) => BackendKind::Memory,
            Backend::Postgres(_) => BackendKind::Postgres,
        }
    }

    pub fn provider(&self) -> Arc<dyn SessionProvider> {
        match self {
            Backend::Memory(store) => Arc::new(store.clone()),
            Backend::Postgres(provider) => Arc::new(provider.clone()),
        }
    }

    /// Bring the catalogue schema up to date. Memory tables need no schema.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        if let Backend::Postgres(provider) = self {
            sqlx::migrate!("../../migrations")
                .run(provider.pool())
                .await?;
            info!("Database migrations applied");
        }
        Ok(())
    }
}

pub struct BackendFactory;

impl BackendFactory {
    /// Create the backend named by the configuration
    pub async fn create(config: &Config) -> Result<Backend> {
        match config.backend.parse::<BackendKind>()? {
            BackendKind::Memory => {
                info!("Creating in-memory session backend");
                Ok(Backend::Memory(MemoryStore::new()))
            }
            BackendKind::Postgres => {
                info!("Creating PostgreSQL session backend");
                let database_url = config.database_url.as_deref().ok_or_else(|| {
                    Error::Configuration(
                        "DATABASE_URL is required for the postgres backend".to_string(),
                    )
                })?;
                let provider =
                    PgSessionProvider::connect(database_url, config.max_connections).await?;
                Ok(Backend::Postgres(provider))
            }
        }
    }
}
