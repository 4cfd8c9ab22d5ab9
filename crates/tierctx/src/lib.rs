//! Tiered context memory for prompts with a hard token budget.
//!
//! `tierctx` keeps an unbounded stream of context (conversation turns, tool
//! output, documents) in three tiers and decides which of it is resident in
//! the prompt at any moment. The core abstraction is the
//! [`ContextManager`](manager::ContextManager): callers add content, ask for
//! what is relevant to a query, and periodically call
//! [`optimize()`](manager::ContextManager::optimize) to rebalance.
//!
//! | Tier | Capacity | Form |
//! |------|----------|------|
//! | `Active` | `active_capacity_tokens` (hard) | always uncompressed |
//! | `Working` | `active × working_capacity_multiplier` | compressed above the inline threshold |
//! | `LongTerm` | unbounded, subject to retention | compressed when an acceptable form exists |
//!
//! # Getting started
//!
//! ```ignore
//! use tierctx::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> tierctx::error::Result<()> {
//!     let config = ContextConfig::default()
//!         .with_active_capacity(8_000)
//!         .with_retention(LongTermRetention::MaxCount(500));
//!     let manager = ContextManager::new(config)?;
//!
//!     manager.add_context("Build failed: missing libssl", Metadata::new()).await?;
//!     let hits = manager.retrieve_relevant("why did the build fail", DEFAULT_RETRIEVAL_LIMIT).await?;
//!     for seg in &hits {
//!         println!("{} [{}] {}", seg.id, seg.tier, seg.content());
//!     }
//!
//!     let summary = manager.optimize().await?;
//!     println!("{} transition(s)", summary.total());
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Placement and movement between tiers:** [`TierManager`](tier::TierManager),
//!   with scoring and eviction order in [`tier::policy`].
//! - **Compression:** [`CompressionEngine`](compression::CompressionEngine) and
//!   the lossless / extractive codecs under [`compression`].
//! - **Relevance:** [`RetrievalEngine`](retrieval::RetrievalEngine); embedding
//!   backends ([`HashingEmbedder`](retrieval::embedding::HashingEmbedder),
//!   [`HttpEmbedder`](retrieval::embedding::HttpEmbedder)) live in
//!   [`retrieval::embedding`].
//! - **Injected capabilities:** [`Tokenizer`](tokenizer::Tokenizer),
//!   [`EmbeddingBackend`](retrieval::embedding::EmbeddingBackend),
//!   [`Segmenter`](segmenter::Segmenter) and [`Clock`](clock::Clock).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`manager`] | [`ContextManager`](manager::ContextManager) and its builder |
//! | [`tier`] | Tier capacity invariants, promotion, demotion, retention |
//! | [`store`] | Indexed segment storage |
//! | [`compression`] | Lossless, extractive and head/tail compression |
//! | [`retrieval`] | Keyword, semantic and hybrid ranking, embedding cache |
//! | [`metrics`] | Utilization, hit rate, compression ratio, latency percentiles |
//! | [`config`] | [`ContextConfig`](config::ContextConfig), JSON loading and schema |
//! | [`segment`] | Segment, tier and id types |
//! | [`segmenter`] | Splitting oversized content |
//! | [`error`] | [`ContextError`](error::ContextError) |

pub mod clock;
pub mod compression;
pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod prelude;
pub mod retrieval;
pub mod segment;
pub mod segmenter;
pub mod store;
pub mod text;
pub mod tier;
pub mod tokenizer;

pub use error::{ContextError, Result};
pub use manager::{ContextManager, DEFAULT_RETRIEVAL_LIMIT};
