//! Error types for confidential compute operations.

use auction_types::{Handle, ValueKind};
use thiserror::Error;

/// Errors that can occur when using the confidential compute capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComputeError {
    #[error("Principal is not authorized to view this value")]
    NotAuthorized,

    #[error("Confidential compute service unavailable")]
    Unavailable,

    #[error("Unknown ciphertext handle {0}")]
    UnknownHandle(Handle),

    #[error("Kind mismatch: expected {expected:?}, got {got:?}")]
    KindMismatch { expected: ValueKind, got: ValueKind },

    #[error("Sealing failed: {0}")]
    Sealing(String),
}

impl ComputeError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ComputeError::Unavailable)
    }
}
