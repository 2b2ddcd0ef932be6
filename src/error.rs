//! Error taxonomy shared by the access layer, collectors, and builder.
//!
//! `spec.md` §7 defines six outcomes for a cluster read: NotAuthorized,
//! NotFound, Unavailable, Transient, ValidationError, PermanentOther.
//! `AccessError` is what the cluster access layer (C1) returns; collectors
//! and the topology builder fold it (and their own validation failures)
//! into `StargazerError`, which is what callers of the engine see.

use thiserror::Error;

/// Error normalized at the cluster access boundary (C1).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cluster unavailable: {0}")]
    Unavailable(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("{0}")]
    PermanentOther(String),
}

impl AccessError {
    /// True for errors a caller may sensibly retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AccessError::Transient(_) | AccessError::Unavailable(_))
    }
}

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum StargazerError {
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("transient error, retry: {0}")]
    Transient(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("{context}: {source}")]
    PermanentOther {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<AccessError> for StargazerError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::NotAuthorized(msg) => StargazerError::NotAuthorized(msg),
            AccessError::NotFound(msg) => {
                // NotFound never reaches here for optional kinds (the builder
                // treats it as empty); a mandatory kind surfacing NotFound is
                // itself a permanent condition (the resource kind is unknown
                // to the API server).
                StargazerError::PermanentOther {
                    context: "mandatory resource kind not found".to_string(),
                    source: anyhow::anyhow!(msg),
                }
            }
            AccessError::Unavailable(msg) => StargazerError::Transient(msg),
            AccessError::Transient(msg) => StargazerError::Transient(msg),
            AccessError::PermanentOther(msg) => StargazerError::PermanentOther {
                context: "cluster access".to_string(),
                source: anyhow::anyhow!(msg),
            },
        }
    }
}

/// Attach "failed to list {kind}: …" context to an access error, per
/// `spec.md` §7's leaf-collector propagation policy.
pub fn with_kind_context(kind: &str, err: AccessError) -> AccessError {
    match err {
        AccessError::NotAuthorized(m) => {
            AccessError::NotAuthorized(format!("failed to list {kind}: {m}"))
        }
        AccessError::NotFound(m) => AccessError::NotFound(format!("failed to list {kind}: {m}")),
        AccessError::Unavailable(m) => {
            AccessError::Unavailable(format!("failed to list {kind}: {m}"))
        }
        AccessError::Transient(m) => AccessError::Transient(format!("failed to list {kind}: {m}")),
        AccessError::PermanentOther(m) => {
            AccessError::PermanentOther(format!("failed to list {kind}: {m}"))
        }
    }
}
