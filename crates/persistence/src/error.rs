//! Errors raised by multi-statement repository operations.

use domain::DomainError;
use thiserror::Error;

/// Failure of a repository operation that checks business rules while
/// holding row locks.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// A ledger or scheduling rule rejected the change; the transaction was
    /// rolled back.
    #[error(transparent)]
    Rule(#[from] DomainError),

    #[error("{0} not found")]
    NotFound(&'static str),
}
