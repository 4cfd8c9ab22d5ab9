//! Compression engine: shrink a segment's token footprint for colder tiers.
//!
//! Strategies form a closed set ([`CompressionStrategy`]):
//!
//! 1. **`Lossless`**: line-level dictionary encoding. Exact round trip.
//! 2. **`ExtractiveSummary`**: keeps the most representative sentences.
//! 3. **`HeadTail`**: keeps the beginning and end of the content.
//! 4. **`Adaptive`**: picks `Lossless` for structured content and
//!    `ExtractiveSummary` for prose.
//!
//! Compression never fails for quality reasons. When the achieved ratio
//! misses the target or the quality estimate is below the configured
//! threshold, the outcome carries `below_threshold = true` and the tier
//! manager decides what to do with it.

pub mod extractive;
pub mod lossless;

use crate::error::{ContextError, Result};
use crate::text;
use crate::tokenizer::Tokenizer;
use lossless::LineTable;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Slack allowed between the requested and achieved ratio.
const RATIO_TOLERANCE: f64 = 0.05;

/// Content types that `Adaptive` treats as structured.
const STRUCTURED_TYPES: &[&str] = &["code", "log", "json", "table"];

/// Repeated-line share above which `Adaptive` treats content as structured.
const STRUCTURED_REPEAT_SHARE: f64 = 0.25;

/// Compression strategy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStrategy {
    Lossless,
    ExtractiveSummary,
    HeadTail,
    Adaptive,
}

impl CompressionStrategy {
    pub fn is_lossless(self) -> bool {
        matches!(self, CompressionStrategy::Lossless)
    }
}

impl Default for CompressionStrategy {
    fn default() -> Self {
        CompressionStrategy::Adaptive
    }
}

/// Strategy-specific payload of a compressed segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressedPayload {
    /// Unique lines plus one reference per original line.
    Lines { lines: Vec<String>, refs: Vec<u32> },
    /// Lossy approximation of the original.
    Text(String),
}

/// A segment's compressed form, with enough metadata to decompress it or
/// judge its quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedContent {
    /// Concrete strategy that produced this form (never `Adaptive`).
    pub strategy: CompressionStrategy,
    pub payload: CompressedPayload,
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    /// `compressed_tokens / original_tokens`.
    pub achieved_ratio: f64,
    /// Similarity estimate between original and compressed content, 0–1.
    pub quality: f64,
}

impl CompressedContent {
    /// Best available text: exact for lossless payloads, the approximation
    /// otherwise.
    pub fn render(&self) -> String {
        match &self.payload {
            CompressedPayload::Lines { lines, refs } => refs
                .iter()
                .filter_map(|r| lines.get(*r as usize).map(String::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            CompressedPayload::Text(text) => text.clone(),
        }
    }

    /// Bytes held by the payload.
    pub fn resident_bytes(&self) -> usize {
        match &self.payload {
            CompressedPayload::Lines { lines, refs } => {
                lines.iter().map(String::len).sum::<usize>() + refs.len() * size_of::<u32>()
            }
            CompressedPayload::Text(text) => text.len(),
        }
    }

    /// Token count of [`render`](Self::render)'s output.
    pub fn rendered_tokens(&self) -> usize {
        match self.payload {
            CompressedPayload::Lines { .. } => self.original_tokens,
            CompressedPayload::Text(_) => self.compressed_tokens,
        }
    }
}

/// Result of a compression attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionOutcome {
    pub compressed: CompressedContent,
    /// The target ratio was missed or quality fell below the threshold.
    pub below_threshold: bool,
}

impl CompressionOutcome {
    pub fn achieved_ratio(&self) -> f64 {
        self.compressed.achieved_ratio
    }

    pub fn quality(&self) -> f64 {
        self.compressed.quality
    }
}

/// Compresses and decompresses segment content.
///
/// Cheap to clone; shares the tokenizer.
#[derive(Debug, Clone)]
pub struct CompressionEngine {
    strategy: CompressionStrategy,
    overrides: BTreeMap<String, CompressionStrategy>,
    target_ratio: f64,
    quality_threshold: f64,
    tokenizer: Arc<dyn Tokenizer>,
}

impl CompressionEngine {
    pub fn new(
        strategy: CompressionStrategy,
        target_ratio: f64,
        quality_threshold: f64,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        Self {
            strategy,
            overrides: BTreeMap::new(),
            target_ratio,
            quality_threshold,
            tokenizer,
        }
    }

    /// Use `strategy` for content whose metadata `type` equals `content_type`.
    pub fn with_override(
        mut self,
        content_type: impl Into<String>,
        strategy: CompressionStrategy,
    ) -> Self {
        self.overrides.insert(content_type.into(), strategy);
        self
    }

    pub fn target_ratio(&self) -> f64 {
        self.target_ratio
    }

    pub fn quality_threshold(&self) -> f64 {
        self.quality_threshold
    }

    /// Concrete strategy for this content: per-type override, then the
    /// configured strategy, with `Adaptive` resolved by content shape.
    pub fn select_strategy(&self, content: &str, content_type: Option<&str>) -> CompressionStrategy {
        let chosen = content_type
            .and_then(|t| self.overrides.get(t).copied())
            .unwrap_or(self.strategy);
        if chosen == CompressionStrategy::Adaptive {
            resolve_adaptive(content, content_type)
        } else {
            chosen
        }
    }

    /// Compress with the strategy selected for `content_type`.
    pub fn compress(
        &self,
        content: &str,
        target_ratio: f64,
        content_type: Option<&str>,
    ) -> CompressionOutcome {
        let strategy = self.select_strategy(content, content_type);
        self.compress_with(strategy, content, target_ratio)
    }

    /// Compress with an explicit strategy. `Adaptive` is resolved first.
    pub fn compress_with(
        &self,
        strategy: CompressionStrategy,
        content: &str,
        target_ratio: f64,
    ) -> CompressionOutcome {
        let strategy = if strategy == CompressionStrategy::Adaptive {
            resolve_adaptive(content, None)
        } else {
            strategy
        };
        let original_tokens = self.tokenizer.count(content);

        let (payload, compressed_tokens, quality) = match strategy {
            CompressionStrategy::Lossless | CompressionStrategy::Adaptive => {
                let table = lossless::encode(content);
                // Each repeated line costs one reference token.
                let tokens = self.tokenizer.count(&table.lines.join("\n")) + table.repeated();
                let LineTable { lines, refs } = table;
                (CompressedPayload::Lines { lines, refs }, tokens, 1.0)
            }
            CompressionStrategy::ExtractiveSummary => {
                let budget = (original_tokens as f64 * target_ratio).ceil() as usize;
                let summary = extractive::summarize(content, budget, self.tokenizer.as_ref());
                self.lossy(content, summary)
            }
            CompressionStrategy::HeadTail => {
                let kept = extractive::head_tail(content, target_ratio);
                self.lossy(content, kept)
            }
        };

        let achieved_ratio = if original_tokens == 0 {
            1.0
        } else {
            compressed_tokens as f64 / original_tokens as f64
        };
        let compressed = CompressedContent {
            strategy,
            payload,
            original_tokens,
            compressed_tokens,
            achieved_ratio,
            quality,
        };
        let below_threshold = self.misses_threshold(&compressed, target_ratio);
        trace!(
            "[compress] {:?}: {} -> {} tokens (ratio {:.2}, quality {:.2}, below_threshold={})",
            strategy, original_tokens, compressed_tokens, achieved_ratio, quality, below_threshold
        );

        CompressionOutcome {
            compressed,
            below_threshold,
        }
    }

    /// Whether `compressed` missed `target_ratio` or the quality threshold.
    pub fn misses_threshold(&self, compressed: &CompressedContent, target_ratio: f64) -> bool {
        compressed.achieved_ratio > target_ratio + RATIO_TOLERANCE
            || compressed.quality < self.quality_threshold
    }

    fn lossy(&self, original: &str, approximation: String) -> (CompressedPayload, usize, f64) {
        let tokens = self.tokenizer.count(&approximation);
        let quality = text::cosine(
            &text::term_frequencies(original),
            &text::term_frequencies(&approximation),
        );
        (CompressedPayload::Text(approximation), tokens, quality)
    }

    /// Reconstruct text. Exact for lossless payloads; the stored
    /// approximation for lossy ones.
    pub fn decompress(&self, compressed: &CompressedContent) -> Result<String> {
        match &compressed.payload {
            CompressedPayload::Lines { lines, refs } => {
                let table = LineTable {
                    lines: lines.clone(),
                    refs: refs.clone(),
                };
                lossless::decode(&table).ok_or_else(|| {
                    ContextError::backend("lossless payload references a missing line")
                })
            }
            CompressedPayload::Text(text) => Ok(text.clone()),
        }
    }

    /// Whether an outcome may replace the raw content: quality at or above
    /// the threshold and a strictly smaller footprint.
    pub fn is_acceptable(&self, outcome: &CompressionOutcome) -> bool {
        let c = &outcome.compressed;
        c.quality >= self.quality_threshold && c.compressed_tokens < c.original_tokens
    }

    /// Try the selected strategy, then `Lossless` as the upgrade path.
    /// Returns the first acceptable outcome, or the last attempt if none was.
    pub fn compress_for_tier(&self, content: &str, content_type: Option<&str>) -> CompressionOutcome {
        let first = self.compress(content, self.target_ratio, content_type);
        if self.is_acceptable(&first) || first.compressed.strategy.is_lossless() {
            return first;
        }
        let fallback = self.compress_with(CompressionStrategy::Lossless, content, self.target_ratio);
        if self.is_acceptable(&fallback) {
            fallback
        } else {
            first
        }
    }

    /// Run [`compress_for_tier`](Self::compress_for_tier) on the blocking
    /// pool so it never stalls the async runtime.
    pub async fn compress_detached(
        &self,
        content: String,
        content_type: Option<String>,
    ) -> Result<CompressionOutcome> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || {
            engine.compress_for_tier(&content, content_type.as_deref())
        })
        .await
        .map_err(|e| ContextError::backend(format!("compression worker failed: {e}")))
    }
}

/// `Lossless` for structured content, `ExtractiveSummary` for prose.
fn resolve_adaptive(content: &str, content_type: Option<&str>) -> CompressionStrategy {
    let structured = content_type.is_some_and(|t| STRUCTURED_TYPES.contains(&t))
        || lossless::repeated_line_share(content) >= STRUCTURED_REPEAT_SHARE;
    if structured {
        CompressionStrategy::Lossless
    } else {
        CompressionStrategy::ExtractiveSummary
    }
}
