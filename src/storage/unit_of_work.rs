use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, warn};

use super::{Queries, Repository};

/// How eagerly a transaction takes the database write lock.
///
/// SQLite transactions are always serializable; the level decides when
/// competing writers are turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Lock taken on first write; reads before that may be overtaken.
    Deferred,
    /// Write lock taken at BEGIN. Every read inside the transaction is current.
    #[default]
    Serializable,
    /// Like `Serializable`, and also blocks readers outside WAL mode.
    Exclusive,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::Deferred => "deferred",
            IsolationLevel::Serializable => "serializable",
            IsolationLevel::Exclusive => "exclusive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deferred" => Some(IsolationLevel::Deferred),
            "serializable" | "immediate" => Some(IsolationLevel::Serializable),
            "exclusive" => Some(IsolationLevel::Exclusive),
            _ => None,
        }
    }

    fn begin_statement(&self) -> &'static str {
        match self {
            IsolationLevel::Deferred => "BEGIN DEFERRED",
            IsolationLevel::Serializable => "BEGIN IMMEDIATE",
            IsolationLevel::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failures of the transaction itself, as opposed to the work done inside it.
#[derive(Debug, Error)]
pub enum TxError {
    #[error("Failed to begin transaction: {0}")]
    Begin(#[source] sqlx::Error),

    #[error("Failed to commit transaction: {0}")]
    Commit(#[source] sqlx::Error),

    #[error("{source} (rollback also failed: {rollback})")]
    Rollback {
        source: Box<dyn std::error::Error + Send + Sync>,
        rollback: sqlx::Error,
    },
}

impl Repository {
    /// Run `f` inside a single transaction.
    ///
    /// Commits when `f` succeeds and rolls back when it fails, returning the
    /// error from `f` unchanged. If the future is dropped before completion the
    /// transaction is rolled back when its connection returns to the pool.
    pub async fn exec_tx<T, E, F>(&self, isolation: IsolationLevel, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<TxError> + std::error::Error + Send + Sync + 'static,
        F: for<'c> FnOnce(Queries<'c>) -> BoxFuture<'c, Result<T, E>> + Send,
    {
        let mut tx = self
            .pool()
            .begin_with(isolation.begin_statement())
            .await
            .map_err(TxError::Begin)?;

        match f(Queries::new(&mut tx)).await {
            Ok(value) => {
                tx.commit().await.map_err(TxError::Commit)?;
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "Rolling back transaction");
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %err, rollback_error = %rollback, "Rollback failed");
                    return Err(TxError::Rollback {
                        source: Box::new(err),
                        rollback,
                    }
                    .into());
                }
                Err(err)
            }
        }
    }
}
