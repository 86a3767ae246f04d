//! Explicit transaction scope over a session container
//!
//! Lifecycle: `Created -> Open -> Committed | RolledBack`, with `Disposed`
//! reachable from any state. Commit flushes pending changes first; rollback
//! discards them without writing. A commit whose flush fails keeps the batch
//! queued, so retrying the commit writes it again.

use tokio_util::sync::CancellationToken;
use tracing::warn;
use unitwork_common::{Error, Result};

use crate::container::SessionContainer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Created,
    Open,
    Committed,
    RolledBack,
    Disposed,
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Open => write!(f, "open"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled back"),
            Self::Disposed => write!(f, "disposed"),
        }
    }
}

pub struct Transaction {
    container: SessionContainer,
    state: TransactionState,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("backend", &self.container.backend())
            .field("state", &self.state)
            .finish()
    }
}

impl Transaction {
    pub fn new(container: SessionContainer) -> Self {
        Self {
            container,
            state: TransactionState::Created,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TransactionState::Open
    }

    pub async fn begin(&mut self, ct: &CancellationToken) -> Result<()> {
        match self.state {
            TransactionState::Created => {}
            TransactionState::Open => {
                return Err(Error::IllegalState("Transaction already open".to_string()))
            }
            state => {
                return Err(Error::IllegalState(format!(
                    "Transaction cannot begin once {}",
                    state
                )))
            }
        }
        self.container.begin_transaction(ct).await?;
        self.state = TransactionState::Open;
        Ok(())
    }

    /// Flush pending changes and make everything since begin durable.
    /// On failure the transaction stays open so it can still be rolled back.
    pub async fn commit(&mut self, ct: &CancellationToken) -> Result<()> {
        self.require_open()?;
        self.container.commit_transaction(ct).await?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Discard pending changes and undo everything since begin
    pub async fn rollback(&mut self, ct: &CancellationToken) -> Result<()> {
        self.require_open()?;
        self.container.rollback_transaction(ct).await?;
        self.state = TransactionState::RolledBack;
        Ok(())
    }

    /// Roll back if still open, then release the scope. Never fails; calling
    /// it again is a no-op.
    pub async fn dispose(&mut self) {
        if self.state == TransactionState::Disposed {
            return;
        }
        if self.state == TransactionState::Open {
            if let Err(e) = self
                .container
                .rollback_transaction(&CancellationToken::new())
                .await
            {
                warn!(error = %e, "Rollback during dispose failed");
                self.container.mark_abandoned();
            }
        }
        self.state = TransactionState::Disposed;
    }

    fn require_open(&self) -> Result<()> {
        if self.state != TransactionState::Open {
            return Err(Error::IllegalState(format!(
                "Transaction must be open, but is {}",
                self.state
            )));
        }
        Ok(())
    }
}

impl Drop for Transaction {
    #[mutants::skip]
    fn drop(&mut self) {
        if self.state == TransactionState::Open {
            warn!(
                backend = self.container.backend(),
                "Transaction dropped while open, rolling back on next use"
            );
            self.container.mark_abandoned();
        }
    }
}
