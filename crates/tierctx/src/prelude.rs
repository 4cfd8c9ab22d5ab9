//! Convenience re-exports for common `tierctx` types.
//!
//! ```ignore
//! use tierctx::prelude::*;
//! ```

// ── Manager ─────────────────────────────────────────────────────────
pub use crate::manager::{
    ContextManager, ContextManagerBuilder, ContextStatus, DEFAULT_RETRIEVAL_LIMIT,
};

// ── Configuration and errors ────────────────────────────────────────
pub use crate::config::{ContextConfig, LongTermRetention};
pub use crate::error::{ContextError, ErrorKind, Result};

// ── Data model ──────────────────────────────────────────────────────
pub use crate::compression::{CompressionOutcome, CompressionStrategy};
pub use crate::metrics::{ContextMetrics, Operation, OptimizationSummary, TierStats};
pub use crate::retrieval::RetrievalStrategy;
pub use crate::segment::{Metadata, Segment, SegmentId, Tier};

// ── Capabilities ────────────────────────────────────────────────────
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::retrieval::embedding::{EmbeddingBackend, HashingEmbedder, HttpEmbedder};
pub use crate::segmenter::{ParagraphSegmenter, Segmenter};
pub use crate::tokenizer::{CharRatioTokenizer, Tokenizer, WhitespaceTokenizer};
