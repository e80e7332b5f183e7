//! Domain error types.

use thiserror::Error;

/// A business rule rejected the requested operation.
///
/// The variant picks the HTTP status the API layer answers with; the
/// message is shown to the client verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    /// Input is well-formed but violates a rule (400).
    #[error("{0}")]
    Invalid(String),

    /// Caller's clearance does not allow this change (403).
    #[error("{0}")]
    Forbidden(String),

    /// The resource is no longer open for this operation (410).
    #[error("{0}")]
    Gone(String),
}

impl DomainError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn gone(msg: impl Into<String>) -> Self {
        Self::Gone(msg.into())
    }
}
