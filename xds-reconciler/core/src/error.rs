use crate::{PushError, ResourceKind};

/// Errors that abort a batch.
///
/// Everything except [`Error::Push`] is detected before any mutation is issued.
/// Push errors are reported after the batch's own mutations have been reverted.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid type for {declared}: found {decoded}")]
    TypeMismatch { declared: String, decoded: String },

    #[error("failed to decode {kind}: {source}")]
    Decode {
        kind: ResourceKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} name not provided")]
    MissingName { kind: ResourceKind },

    #[error("duplicate {kind} name {name:?}")]
    DuplicateName { kind: ResourceKind, name: String },

    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("listener port allocation for {listener:?} failed: {reason}")]
    PortAllocation { listener: String, reason: String },

    #[error("could not validate {kind} {name:?} ({reason}): {content}")]
    Validation {
        kind: ResourceKind,
        name: String,
        reason: String,
        content: String,
    },

    #[error(transparent)]
    Push(#[from] PushError),
}

// === impl Error ===

impl Error {
    /// Indicates whether the error was raised before any push or delete was
    /// issued, so that no rollback was necessary.
    pub fn is_pre_mutation(&self) -> bool {
        !matches!(self, Self::Push(_))
    }
}
