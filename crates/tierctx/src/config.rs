//! Manager configuration.
//!
//! [`ContextConfig`] is plain data with builder-style setters. Config files
//! are JSON; they are checked against the generated JSON schema before
//! deserialization so typos and wrong types produce a path-qualified error
//! instead of a silent default.
//!
//! ```
//! use tierctx::config::{ContextConfig, LongTermRetention};
//!
//! let config = ContextConfig::default()
//!     .with_active_capacity(8_000)
//!     .with_retention(LongTermRetention::MaxCount(500));
//! assert!(config.validate().is_ok());
//! assert_eq!(config.working_capacity_tokens(), 32_000);
//! ```

use crate::compression::CompressionStrategy;
use crate::error::{ContextError, Result};
use crate::metrics::DEFAULT_LATENCY_WINDOW;
use crate::retrieval::RetrievalStrategy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// How long LongTerm keeps segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LongTermRetention {
    /// Keep everything until removed explicitly.
    #[default]
    Unlimited,
    /// Evict segments not accessed for this many seconds.
    MaxAgeSeconds(u64),
    /// Keep at most this many segments; the lowest composite scores go first.
    MaxCount(usize),
}

/// Configuration for a [`ContextManager`](crate::manager::ContextManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ContextConfig {
    /// Hard token capacity of the Active tier.
    pub active_capacity_tokens: usize,
    /// Working capacity as a multiple of Active capacity (2–10).
    pub working_capacity_multiplier: f64,
    pub longterm_retention: LongTermRetention,

    pub compression_strategy: CompressionStrategy,
    /// Desired `compressed / original` token ratio.
    pub compression_target_ratio: f64,
    /// Minimum quality for a lossy result to replace the original (0–1).
    pub quality_threshold: f64,
    /// Segments at or below this size move into Working uncompressed.
    pub inline_threshold_tokens: usize,
    /// Per content type (metadata `type`) compression strategy.
    pub strategy_overrides: BTreeMap<String, CompressionStrategy>,

    pub retrieval_strategy: RetrievalStrategy,
    /// Minimum similarity for a segment to be returned (0–1).
    pub similarity_threshold: f64,
    /// Keyword share of the hybrid score (0–1).
    pub hybrid_keyword_weight: f64,
    pub max_retrieval_results: usize,
    /// Promote returned segments one tier warmer.
    pub promote_on_retrieval: bool,

    /// Content above this size is split into several segments.
    pub max_segment_tokens: usize,
    /// Overlap between fixed-size chunks.
    pub chunk_overlap_tokens: usize,
    /// Idle time after which a segment's recency weight halves.
    pub recency_decay_secs: u64,

    /// Optimistic retries before `ConcurrentModification` is surfaced.
    pub max_conflict_retries: u32,
    /// Removing an unknown id is an error.
    pub strict_delete: bool,

    pub metrics_enabled: bool,
    /// Latency samples kept per operation.
    pub metrics_window: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            active_capacity_tokens: 32_000,
            working_capacity_multiplier: 4.0,
            longterm_retention: LongTermRetention::Unlimited,
            compression_strategy: CompressionStrategy::Adaptive,
            compression_target_ratio: 0.3,
            quality_threshold: 0.8,
            inline_threshold_tokens: 256,
            strategy_overrides: BTreeMap::new(),
            retrieval_strategy: RetrievalStrategy::Hybrid,
            similarity_threshold: 0.3,
            hybrid_keyword_weight: 0.5,
            max_retrieval_results: 20,
            promote_on_retrieval: true,
            max_segment_tokens: 2_048,
            chunk_overlap_tokens: 64,
            recency_decay_secs: 3_600,
            max_conflict_retries: 3,
            strict_delete: true,
            metrics_enabled: true,
            metrics_window: DEFAULT_LATENCY_WINDOW,
        }
    }
}

impl ContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Builders ──

    pub fn with_active_capacity(mut self, tokens: usize) -> Self {
        self.active_capacity_tokens = tokens;
        self
    }

    pub fn with_working_multiplier(mut self, multiplier: f64) -> Self {
        self.working_capacity_multiplier = multiplier;
        self
    }

    pub fn with_retention(mut self, retention: LongTermRetention) -> Self {
        self.longterm_retention = retention;
        self
    }

    pub fn with_compression_strategy(mut self, strategy: CompressionStrategy) -> Self {
        self.compression_strategy = strategy;
        self
    }

    pub fn with_target_ratio(mut self, ratio: f64) -> Self {
        self.compression_target_ratio = ratio;
        self
    }

    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn with_inline_threshold(mut self, tokens: usize) -> Self {
        self.inline_threshold_tokens = tokens;
        self
    }

    /// Compress content tagged `type = content_type` with `strategy`.
    pub fn with_strategy_override(
        mut self,
        content_type: impl Into<String>,
        strategy: CompressionStrategy,
    ) -> Self {
        self.strategy_overrides.insert(content_type.into(), strategy);
        self
    }

    pub fn with_retrieval_strategy(mut self, strategy: RetrievalStrategy) -> Self {
        self.retrieval_strategy = strategy;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_keyword_weight(mut self, weight: f64) -> Self {
        self.hybrid_keyword_weight = weight;
        self
    }

    pub fn with_max_retrieval_results(mut self, n: usize) -> Self {
        self.max_retrieval_results = n;
        self
    }

    pub fn with_promote_on_retrieval(mut self, promote: bool) -> Self {
        self.promote_on_retrieval = promote;
        self
    }

    pub fn with_max_segment_tokens(mut self, tokens: usize) -> Self {
        self.max_segment_tokens = tokens;
        self
    }

    pub fn with_chunk_overlap(mut self, tokens: usize) -> Self {
        self.chunk_overlap_tokens = tokens;
        self
    }

    pub fn with_recency_decay_secs(mut self, secs: u64) -> Self {
        self.recency_decay_secs = secs;
        self
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn with_strict_delete(mut self, strict: bool) -> Self {
        self.strict_delete = strict;
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    // ── Derived values ──

    /// Working tier capacity in tokens.
    pub fn working_capacity_tokens(&self) -> usize {
        (self.active_capacity_tokens as f64 * self.working_capacity_multiplier).floor() as usize
    }

    /// Check every range constraint.
    pub fn validate(&self) -> Result<()> {
        fn unit(name: &str, v: f64) -> Result<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ContextError::config(format!("{name} must be in [0, 1], got {v}")))
            }
        }

        if self.active_capacity_tokens == 0 {
            return Err(ContextError::config("active_capacity_tokens must be positive"));
        }
        if !(2.0..=10.0).contains(&self.working_capacity_multiplier) {
            return Err(ContextError::config(format!(
                "working_capacity_multiplier must be in [2, 10], got {}",
                self.working_capacity_multiplier
            )));
        }
        if !(self.compression_target_ratio > 0.0 && self.compression_target_ratio <= 1.0) {
            return Err(ContextError::config(format!(
                "compression_target_ratio must be in (0, 1], got {}",
                self.compression_target_ratio
            )));
        }
        unit("quality_threshold", self.quality_threshold)?;
        unit("similarity_threshold", self.similarity_threshold)?;
        unit("hybrid_keyword_weight", self.hybrid_keyword_weight)?;
        if self.max_retrieval_results == 0 {
            return Err(ContextError::config("max_retrieval_results must be positive"));
        }
        if self.max_segment_tokens == 0 {
            return Err(ContextError::config("max_segment_tokens must be positive"));
        }
        if self.chunk_overlap_tokens >= self.max_segment_tokens {
            return Err(ContextError::config(format!(
                "chunk_overlap_tokens ({}) must be below max_segment_tokens ({})",
                self.chunk_overlap_tokens, self.max_segment_tokens
            )));
        }
        if self.recency_decay_secs == 0 {
            return Err(ContextError::config("recency_decay_secs must be positive"));
        }
        if self.longterm_retention == LongTermRetention::MaxCount(0) {
            return Err(ContextError::config("longterm_retention max_count must be positive"));
        }
        if self.metrics_window == 0 {
            return Err(ContextError::config("metrics_window must be positive"));
        }
        Ok(())
    }

    // ── Files ──

    /// Parse, schema-check and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| ContextError::config(format!("invalid JSON: {e}")))?;
        check_schema(&value)?;
        let config: ContextConfig = serde_json::from_value(value)
            .map_err(|e| ContextError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ContextError::config(format!("failed to read {}: {e}", path.display())))?;
        debug!("[config] loaded {} ({} bytes)", path.display(), text.len());
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// JSON schema of [`ContextConfig`].
pub fn config_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(ContextConfig);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

fn check_schema(value: &serde_json::Value) -> Result<()> {
    let schema = config_schema();
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| ContextError::config(format!("config schema is invalid: {e}")))?;
    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ContextError::config(format!(
            "schema validation failed:\n{}",
            errors.join("\n")
        )))
    }
}
