//! Domain errors surfaced by the workflow engines.
//!
//! Every variant is a recoverable caller-facing condition — none of them is
//! fatal to the daemon. The RPC layer downcasts these out of `anyhow::Error`
//! and maps each kind to a distinct JSON-RPC error code.

/// Error returned by guard, connection, RFQ, directory, and mailbox
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Malformed input — the caller can correct and retry.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Missing, unknown, or expired credential.
    #[error("unauthenticated: {0}")]
    Unauthenticated(&'static str),

    /// The caller's role or company standing does not permit the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The caller is authenticated but is not a party allowed to perform
    /// this specific workflow action (e.g. accepting someone else's RFQ).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The operation is not valid for the entity's current state. Also the
    /// outcome observed by the loser of an accept race.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A pending or active relationship of this kind already links the pair.
    #[error("a connection of this kind already exists between these companies")]
    DuplicateRelationship,

    /// The company already has an active quote on this RFQ.
    #[error("company already has an active quote on this RFQ")]
    DuplicateQuote,

    /// Connection request aimed at an impossible target (e.g. self).
    #[error("invalid connection target: {0}")]
    InvalidTarget(String),

    /// A referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Underlying storage failure — reported to the caller as internal.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Any other plumbing failure — reported to the caller as internal.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WorkflowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
