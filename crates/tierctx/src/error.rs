//! Error taxonomy for the context manager.
//!
//! Every error is scoped to the call that produced it. Degraded compression
//! is not an error: it is reported through
//! [`CompressionOutcome::below_threshold`](crate::compression::CompressionOutcome).

use crate::segment::{SegmentId, Tier};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ContextError>;

/// Errors returned by [`ContextManager`](crate::manager::ContextManager)
/// operations and the components beneath it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContextError {
    /// Content passed to `add_context` was empty or whitespace-only.
    #[error("segment content is empty")]
    EmptySegment,

    /// Query passed to `retrieve_relevant` was empty or whitespace-only.
    #[error("query is empty")]
    EmptyQuery,

    /// A configuration value is out of range or the config file is malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A single segment does not fit in its target tier even when empty.
    #[error("segment of {tokens} tokens exceeds tier capacity of {capacity} tokens")]
    SegmentTooLarge {
        /// Token count of the offending segment.
        tokens: usize,
        /// Capacity of the target tier.
        capacity: usize,
    },

    /// Active segments are always held uncompressed.
    #[error("segment {0} is in the active tier and cannot be compressed")]
    ActiveSegment(SegmentId),

    /// No segment with this id exists.
    #[error("segment not found: {0}")]
    NotFound(SegmentId),

    /// A different segment instance already owns this id.
    #[error("duplicate segment id: {0}")]
    DuplicateId(SegmentId),

    /// Optimistic retries were exhausted while rebalancing a tier.
    #[error("concurrent modification of {tier} tier after {attempts} attempts")]
    ConcurrentModification {
        /// Tier whose rebalance kept conflicting.
        tier: Tier,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A compression worker or retrieval backend failed.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A caller-supplied deadline elapsed.
    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout {
        /// Operation name (`add_context`, `retrieve_relevant`).
        operation: &'static str,
        /// Deadline in milliseconds.
        elapsed_ms: u64,
    },
}

/// Coarse classification of [`ContextError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any mutation: bad content, query, or config.
    Validation,
    /// Rejected before any mutation: the segment can never fit.
    Capacity,
    NotFound,
    DuplicateId,
    /// Retried internally, then surfaced.
    Conflict,
    Backend,
    Timeout,
}

impl ContextError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContextError::EmptySegment
            | ContextError::EmptyQuery
            | ContextError::InvalidConfig(_)
            | ContextError::ActiveSegment(_) => ErrorKind::Validation,
            ContextError::SegmentTooLarge { .. } => ErrorKind::Capacity,
            ContextError::NotFound(_) => ErrorKind::NotFound,
            ContextError::DuplicateId(_) => ErrorKind::DuplicateId,
            ContextError::ConcurrentModification { .. } => ErrorKind::Conflict,
            ContextError::BackendUnavailable(_) => ErrorKind::Backend,
            ContextError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Whether this is a validation error (nothing was mutated).
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub(crate) fn backend(message: impl Into<String>) -> Self {
        ContextError::BackendUnavailable(message.into())
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        ContextError::InvalidConfig(message.into())
    }
}
