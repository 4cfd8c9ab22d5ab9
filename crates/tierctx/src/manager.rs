//! The public entry point: [`ContextManager`].
//!
//! A manager is built once from a [`ContextConfig`] plus injected
//! capabilities and then shared by cloning; every clone drives the same
//! tiers.
//!
//! ```ignore
//! let manager = ContextManager::builder(ContextConfig::default())
//!     .with_segmenter(Arc::new(ParagraphSegmenter))
//!     .build()?;
//! let ids = manager.add_context("The deploy failed at step 3.", Metadata::new()).await?;
//! let hits = manager.retrieve_relevant("deploy failure", DEFAULT_RETRIEVAL_LIMIT).await?;
//! ```

use crate::clock::{Clock, SystemClock};
use crate::compression::{CompressionEngine, CompressionOutcome};
use crate::config::ContextConfig;
use crate::error::{ContextError, Result};
use crate::metrics::{ContextMetrics, MetricsCollector, Operation, OptimizationSummary};
use crate::retrieval::embedding::{EmbeddingBackend, HashingEmbedder};
use crate::retrieval::RetrievalEngine;
use crate::segment::{Metadata, Segment, SegmentId, Tier};
use crate::segmenter::{Segmenter, fixed_windows};
use crate::store::SegmentStore;
use crate::tier::{TierLimits, TierManager};
use crate::tokenizer::{CharRatioTokenizer, Tokenizer};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default `limit` for [`ContextManager::retrieve_relevant`].
pub const DEFAULT_RETRIEVAL_LIMIT: usize = 10;

// ── Builder ────────────────────────────────────────────────────────

/// Assembles a [`ContextManager`]. Capabilities left unset use the
/// defaults: [`CharRatioTokenizer`], [`HashingEmbedder`], [`SystemClock`]
/// and fixed word windows instead of a segmenter.
#[derive(Debug)]
pub struct ContextManagerBuilder {
    config: ContextConfig,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    embedder: Option<Arc<dyn EmbeddingBackend>>,
    segmenter: Option<Arc<dyn Segmenter>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ContextManagerBuilder {
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_segmenter(mut self, segmenter: Arc<dyn Segmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the config and wire the components.
    pub fn build(self) -> Result<ContextManager> {
        let config = self.config;
        config.validate()?;

        let tokenizer = self
            .tokenizer
            .unwrap_or_else(|| Arc::new(CharRatioTokenizer::default()));
        let embedder = self
            .embedder
            .unwrap_or_else(|| Arc::new(HashingEmbedder::default()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let mut compression = CompressionEngine::new(
            config.compression_strategy,
            config.compression_target_ratio,
            config.quality_threshold,
            tokenizer.clone(),
        );
        for (content_type, strategy) in &config.strategy_overrides {
            compression = compression.with_override(content_type.clone(), *strategy);
        }

        let metrics = Arc::new(MetricsCollector::new(
            config.metrics_enabled,
            config.metrics_window,
        ));
        let tiers = TierManager::new(
            SegmentStore::new().with_strict_delete(config.strict_delete),
            TierLimits::from_config(&config),
            compression,
            clock.clone(),
            metrics.clone(),
        );
        let retrieval = RetrievalEngine::new(
            config.retrieval_strategy,
            config.similarity_threshold,
            config.hybrid_keyword_weight,
            config.recency_decay_secs,
            embedder.clone(),
        );

        info!(
            "[config] context manager: active={} working={} retention={:?} compression={:?} retrieval={:?} embedder={}",
            config.active_capacity_tokens,
            config.working_capacity_tokens(),
            config.longterm_retention,
            config.compression_strategy,
            config.retrieval_strategy,
            embedder.name()
        );

        Ok(ContextManager {
            inner: Arc::new(Inner {
                config,
                tokenizer,
                segmenter: self.segmenter,
                clock,
                tiers,
                retrieval,
                metrics,
                next_id: AtomicU64::new(0),
            }),
        })
    }
}

// ── Manager ────────────────────────────────────────────────────────

#[derive(Debug)]
struct Inner {
    config: ContextConfig,
    tokenizer: Arc<dyn Tokenizer>,
    segmenter: Option<Arc<dyn Segmenter>>,
    clock: Arc<dyn Clock>,
    tiers: TierManager,
    retrieval: RetrievalEngine,
    metrics: Arc<MetricsCollector>,
    next_id: AtomicU64,
}

/// Tiered context memory. Cloning is cheap and shares all state.
#[derive(Debug, Clone)]
pub struct ContextManager {
    inner: Arc<Inner>,
}

/// Serializable overview returned by [`ContextManager::status`].
#[derive(Debug, Clone, Serialize)]
pub struct ContextStatus {
    pub metrics: ContextMetrics,
    pub config: ContextConfig,
    /// Resident bytes across all tiers; per-tier figures are in `metrics`.
    pub memory_bytes: usize,
    /// When `optimize` last applied LongTerm retention.
    pub last_cleanup_ms: Option<u64>,
}

impl ContextManager {
    pub fn builder(config: ContextConfig) -> ContextManagerBuilder {
        ContextManagerBuilder {
            config,
            tokenizer: None,
            embedder: None,
            segmenter: None,
            clock: None,
        }
    }

    /// A manager with default capabilities.
    pub fn new(config: ContextConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &ContextConfig {
        &self.inner.config
    }

    // ── Adding and removing ────────────────────────────────────────

    /// Add content to the Active tier. Content above `max_segment_tokens`
    /// becomes several segments; their ids are returned in content order.
    pub async fn add_context(&self, content: &str, metadata: Metadata) -> Result<Vec<SegmentId>> {
        self.add_context_to(content, metadata, Tier::Active).await
    }

    /// Add content directly to `tier`.
    pub async fn add_context_to(
        &self,
        content: &str,
        metadata: Metadata,
        tier: Tier,
    ) -> Result<Vec<SegmentId>> {
        let started = Instant::now();
        let result = self.add_inner(content, metadata, tier).await;
        self.inner
            .metrics
            .record_latency(Operation::Add, started.elapsed());
        result
    }

    /// [`add_context`](Self::add_context) with a deadline. Chunks inserted
    /// before the deadline stay in the store.
    pub async fn add_context_with_timeout(
        &self,
        content: &str,
        metadata: Metadata,
        timeout: Duration,
    ) -> Result<Vec<SegmentId>> {
        with_deadline("add_context", timeout, self.add_context(content, metadata)).await
    }

    async fn add_inner(
        &self,
        content: &str,
        metadata: Metadata,
        tier: Tier,
    ) -> Result<Vec<SegmentId>> {
        let inner = &self.inner;
        if content.trim().is_empty() {
            return Err(ContextError::EmptySegment);
        }

        let chunks: Vec<(String, usize)> = self
            .split(content)
            .into_iter()
            .filter(|c| !c.trim().is_empty())
            .map(|c| {
                let tokens = inner.tokenizer.count(&c);
                (c, tokens)
            })
            .collect();
        if chunks.is_empty() {
            return Err(ContextError::EmptySegment);
        }
        for (_, tokens) in &chunks {
            inner.tiers.check_fits(tier, *tokens)?;
        }

        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, tokens) in chunks {
            let now = inner.clock.now_ms();
            let id = SegmentId::generate(now, inner.next_id.fetch_add(1, Ordering::Relaxed));
            let segment = Segment::new(id.clone(), chunk, tokens, tier, now, metadata.clone());
            inner.tiers.insert(segment).await?;
            ids.push(id);
        }
        debug!(
            "[context] added {} segment(s) to {} from {} chars",
            ids.len(),
            tier,
            content.len()
        );
        Ok(ids)
    }

    fn split(&self, content: &str) -> Vec<String> {
        let inner = &self.inner;
        let max = inner.config.max_segment_tokens;
        if inner.tokenizer.count(content) <= max {
            return vec![content.to_string()];
        }
        match &inner.segmenter {
            Some(segmenter) => segmenter.split(content, max, inner.tokenizer.as_ref()),
            None => fixed_windows(
                content,
                max,
                inner.config.chunk_overlap_tokens,
                inner.tokenizer.as_ref(),
            ),
        }
    }

    /// Remove a segment from whichever tier holds it. With `strict_delete`
    /// off, an unknown id is ignored.
    pub fn remove_context(&self, id: &SegmentId) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.tiers.remove(id);
        self.inner.retrieval.forget(id);
        self.inner
            .metrics
            .record_latency(Operation::Remove, started.elapsed());
        result.map(|_| ())
    }

    /// Replace a segment's content in place. The segment keeps its id and
    /// tier; its version is bumped.
    pub async fn update_content(&self, id: &SegmentId, content: &str) -> Result<Segment> {
        if content.trim().is_empty() {
            return Err(ContextError::EmptySegment);
        }
        let tokens = self.inner.tokenizer.count(content);
        self.inner
            .tiers
            .update_content(id, content.to_string(), tokens)
            .await
    }

    // ── Retrieval ──────────────────────────────────────────────────

    /// Up to `min(limit, max_retrieval_results)` segments relevant to
    /// `query`, best first. Returned segments are touched and, when
    /// `promote_on_retrieval` is set, promoted one tier warmer; the
    /// snapshots reflect both.
    pub async fn retrieve_relevant(&self, query: &str, limit: usize) -> Result<Vec<Segment>> {
        let started = Instant::now();
        let result = self.retrieve_inner(query, limit).await;
        let inner = &self.inner;
        if let Ok(results) = &result {
            inner.metrics.record_retrieval(results.len());
        }
        inner
            .metrics
            .record_latency(Operation::Retrieve, started.elapsed());
        result
    }

    /// [`retrieve_relevant`](Self::retrieve_relevant) with a deadline.
    pub async fn retrieve_relevant_with_timeout(
        &self,
        query: &str,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<Segment>> {
        with_deadline(
            "retrieve_relevant",
            timeout,
            self.retrieve_relevant(query, limit),
        )
        .await
    }

    async fn retrieve_inner(&self, query: &str, limit: usize) -> Result<Vec<Segment>> {
        let inner = &self.inner;
        let limit = limit.min(inner.config.max_retrieval_results);
        let candidates = inner.tiers.retrieval_candidates();
        let ranked = inner
            .retrieval
            .rank(query, candidates, inner.clock.now_ms(), limit)
            .await?;

        let hits = inner.tiers.record_hits(&ranked);
        if inner.config.promote_on_retrieval && !hits.is_empty() {
            let promoted = inner.tiers.promote(&hits).await;
            if promoted.promotions > 0 {
                debug!("[retrieval] promoted {} segment(s)", promoted.promotions);
            }
        }
        Ok(inner.tiers.snapshot(&hits))
    }

    // ── Maintenance ────────────────────────────────────────────────

    /// Rebalance all tiers. See [`TierManager::optimize`] for the steps.
    pub async fn optimize(&self) -> Result<OptimizationSummary> {
        let started = Instant::now();
        let result = self.inner.tiers.optimize().await;
        self.inner
            .metrics
            .record_latency(Operation::Optimize, started.elapsed());
        let (summary, evicted) = result?;
        for id in &evicted {
            self.inner.retrieval.forget(id);
        }
        Ok(summary)
    }

    /// Compress one Working or LongTerm segment now.
    pub async fn compress_segment(&self, id: &SegmentId) -> Result<CompressionOutcome> {
        self.inner.tiers.compress_segment(id).await
    }

    // ── Introspection ──────────────────────────────────────────────

    /// Snapshot of one segment.
    pub fn get(&self, id: &SegmentId) -> Result<Segment> {
        self.inner.tiers.get(id)
    }

    /// Ids in `tier`, least recently used first.
    pub fn ids_in(&self, tier: Tier) -> Vec<SegmentId> {
        self.inner.tiers.ids_in(tier)
    }

    pub fn len(&self) -> usize {
        self.inner.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tiers.is_empty()
    }

    pub fn get_metrics(&self) -> ContextMetrics {
        let inner = &self.inner;
        inner
            .metrics
            .snapshot(inner.tiers.tier_stats(), inner.retrieval.cache_stats())
    }

    pub fn status(&self) -> ContextStatus {
        let metrics = self.get_metrics();
        let memory_bytes = metrics.tiers.iter().map(|t| t.bytes).sum();
        ContextStatus {
            metrics,
            config: self.inner.config.clone(),
            memory_bytes,
            last_cleanup_ms: self.inner.tiers.last_retention_ms(),
        }
    }

    /// Check single-tier membership, token accounting and the Active
    /// capacity invariant.
    pub fn verify_invariants(&self) -> std::result::Result<(), String> {
        self.inner.tiers.verify()
    }
}

async fn with_deadline<T>(
    operation: &'static str,
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            debug!("[context] {} timed out after {:?}", operation, timeout);
            Err(ContextError::Timeout {
                operation,
                elapsed_ms: timeout.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorKind;
    use crate::retrieval::RetrievalStrategy;
    use crate::retrieval::embedding::EmbedFuture;
    use crate::segmenter::ParagraphSegmenter;
    use crate::tokenizer::WhitespaceTokenizer;
    use std::sync::atomic::AtomicBool;

    fn manager(config: ContextConfig, clock: &ManualClock) -> ContextManager {
        ContextManager::builder(config)
            .with_tokenizer(Arc::new(WhitespaceTokenizer))
            .with_clock(Arc::new(clock.clone()))
            .build()
            .unwrap()
    }

    fn words(prefix: &str, n: usize) -> String {
        (0..n)
            .map(|i| format!("{prefix}{i}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[derive(Debug)]
    struct SlowBackend;

    impl EmbeddingBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }

        fn embed<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(texts.iter().map(|_| vec![1.0_f32]).collect())
            })
        }
    }

    #[test]
    fn build_rejects_invalid_config() {
        let err = ContextManager::new(ContextConfig::default().with_similarity_threshold(1.5))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let clock = ManualClock::at_ms(1_000);
        let m = manager(ContextConfig::default(), &clock);
        let err = m.add_context(" \n\t", Metadata::new()).await.unwrap_err();
        assert_eq!(err, ContextError::EmptySegment);
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn long_content_is_split_into_overlapping_windows() {
        let clock = ManualClock::at_ms(1_000);
        let config = ContextConfig::default()
            .with_max_segment_tokens(10)
            .with_chunk_overlap(2);
        let m = manager(config, &clock);
        let ids = m.add_context(&words("w", 25), Metadata::new()).await.unwrap();
        assert_eq!(ids.len(), 3);
        let first = m.get(&ids[0]).unwrap();
        let second = m.get(&ids[1]).unwrap();
        assert_eq!(first.token_count, 10);
        assert!(second.content().starts_with("w8 w9"));
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn segmenter_is_used_for_long_content() {
        let clock = ManualClock::at_ms(1_000);
        let m = ContextManager::builder(
            ContextConfig::default()
                .with_max_segment_tokens(6)
                .with_chunk_overlap(0),
        )
            .with_tokenizer(Arc::new(WhitespaceTokenizer))
            .with_segmenter(Arc::new(ParagraphSegmenter))
            .with_clock(Arc::new(clock.clone()))
            .build()
            .unwrap();
        let ids = m
            .add_context("alpha beta gamma\n\ndelta epsilon\n\nzeta eta theta iota", Metadata::new())
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(m.get(&ids[0]).unwrap().content(), "alpha beta gamma\n\ndelta epsilon");
    }

    #[tokio::test]
    async fn oversized_chunk_fails_before_any_insert() {
        let clock = ManualClock::at_ms(1_000);
        let config = ContextConfig::default()
            .with_active_capacity(20)
            .with_max_segment_tokens(30)
            .with_chunk_overlap(0);
        let m = manager(config, &clock);
        let err = m.add_context(&words("w", 50), Metadata::new()).await.unwrap_err();
        assert_eq!(
            err,
            ContextError::SegmentTooLarge {
                tokens: 30,
                capacity: 20
            }
        );
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn remove_respects_strict_delete() {
        let clock = ManualClock::at_ms(1_000);
        let m = manager(ContextConfig::default(), &clock);
        let ids = m.add_context("some notes", Metadata::new()).await.unwrap();
        m.remove_context(&ids[0]).unwrap();
        assert!(matches!(
            m.remove_context(&ids[0]),
            Err(ContextError::NotFound(_))
        ));

        let lenient = manager(ContextConfig::default().with_strict_delete(false), &clock);
        lenient.remove_context(&"missing".into()).unwrap();
    }

    #[tokio::test]
    async fn retrieval_touches_and_records_hits() {
        let clock = ManualClock::at_ms(1_000);
        let config = ContextConfig::default().with_retrieval_strategy(RetrievalStrategy::Keyword);
        let m = manager(config, &clock);
        let ids = m
            .add_context("the database migration failed", Metadata::new())
            .await
            .unwrap();
        m.add_context("lunch menu for friday", Metadata::new())
            .await
            .unwrap();

        clock.advance_secs(10);
        let hits = m.retrieve_relevant("database migration", DEFAULT_RETRIEVAL_LIMIT).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, ids[0]);
        assert_eq!(hits[0].access_count, 1);
        assert_eq!(hits[0].recency, clock.now_ms());
        assert!(hits[0].relevance_score > 1.0);

        let none = m.retrieve_relevant("kubernetes", 5).await.unwrap();
        assert!(none.is_empty());
        let metrics = m.get_metrics();
        assert_eq!(metrics.retrievals, 2);
        assert_eq!(metrics.retrieval_hit_rate, 0.5);
        assert!(metrics.latency_of(Operation::Retrieve).is_some());
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let clock = ManualClock::at_ms(1_000);
        let m = manager(ContextConfig::default(), &clock);
        let err = m.retrieve_relevant("  ", 5).await.unwrap_err();
        assert_eq!(err, ContextError::EmptyQuery);
    }

    #[tokio::test]
    async fn limit_is_capped_by_config() {
        let clock = ManualClock::at_ms(1_000);
        let config = ContextConfig::default()
            .with_retrieval_strategy(RetrievalStrategy::Keyword)
            .with_max_retrieval_results(2);
        let m = manager(config, &clock);
        for i in 0..5 {
            m.add_context(&format!("shared topic note {i}"), Metadata::new())
                .await
                .unwrap();
        }
        let hits = m.retrieve_relevant("shared topic", 50).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn retrieval_timeout_leaves_store_consistent() {
        let clock = ManualClock::at_ms(1_000);
        let m = ContextManager::builder(
            ContextConfig::default().with_retrieval_strategy(RetrievalStrategy::Semantic),
        )
        .with_tokenizer(Arc::new(WhitespaceTokenizer))
        .with_embedder(Arc::new(SlowBackend))
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap();
        let ids = m.add_context("release checklist", Metadata::new()).await.unwrap();

        let err = m
            .retrieve_relevant_with_timeout("release", 5, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ContextError::Timeout {
                operation: "retrieve_relevant",
                elapsed_ms: 20
            }
        );
        assert_eq!(m.get(&ids[0]).unwrap().access_count, 0);
        m.verify_invariants().unwrap();
    }

    #[tokio::test]
    async fn add_with_timeout_succeeds_within_deadline() {
        let clock = ManualClock::at_ms(1_000);
        let m = manager(ContextConfig::default(), &clock);
        let ids = m
            .add_context_with_timeout("quick note", Metadata::new(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);
    }

    /// Stalls while counting the demotion candidate's content, which only
    /// happens during compression once armed.
    #[derive(Debug, Default)]
    struct StallingTokenizer {
        armed: AtomicBool,
    }

    impl Tokenizer for StallingTokenizer {
        fn count(&self, text: &str) -> usize {
            if self.armed.load(Ordering::SeqCst) && text.starts_with("old0") {
                std::thread::sleep(Duration::from_millis(300));
            }
            WhitespaceTokenizer.count(text)
        }
    }

    #[tokio::test]
    async fn add_timeout_during_demotion_leaves_no_orphan() {
        let clock = ManualClock::at_ms(1_000);
        let tokenizer = Arc::new(StallingTokenizer::default());
        let config = ContextConfig::default()
            .with_active_capacity(100)
            .with_inline_threshold(10);
        let m = ContextManager::builder(config)
            .with_tokenizer(tokenizer.clone())
            .with_clock(Arc::new(clock.clone()))
            .build()
            .unwrap();
        let old = m.add_context(&words("old", 80), Metadata::new()).await.unwrap().remove(0);
        tokenizer.armed.store(true, Ordering::SeqCst);

        let err = m
            .add_context_with_timeout(&words("new", 40), Metadata::new(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(m.len(), 1);
        let kept = m.get(&old).unwrap();
        assert_eq!(kept.tier, Tier::Active);
        assert!(!kept.is_compressed());
        assert!(m.ids_in(Tier::Working).is_empty());
        m.verify_invariants().unwrap();
    }

    #[tokio::test]
    async fn update_content_keeps_id_and_bumps_version() {
        let clock = ManualClock::at_ms(1_000);
        let m = manager(ContextConfig::default(), &clock);
        let id = m.add_context("draft one", Metadata::new()).await.unwrap().remove(0);
        let before = m.get(&id).unwrap();
        let after = m.update_content(&id, "draft two with more words").await.unwrap();
        assert_eq!(after.id, id);
        assert_eq!(after.tier, Tier::Active);
        assert_eq!(after.token_count, 5);
        assert!(after.version > before.version);
        assert_eq!(
            m.update_content(&id, "").await.unwrap_err(),
            ContextError::EmptySegment
        );
    }

    #[tokio::test]
    async fn status_reports_config_and_tiers() {
        let clock = ManualClock::at_ms(1_000);
        let m = manager(ContextConfig::default().with_active_capacity(500), &clock);
        m.add_context("one two three", Metadata::new()).await.unwrap();
        let status = m.status();
        assert_eq!(status.config.active_capacity_tokens, 500);
        assert_eq!(status.metrics.tier(Tier::Active).map(|t| t.tokens), Some(3));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["metrics"]["total_segments"], 1);
    }

    #[tokio::test]
    async fn status_reports_memory_and_last_cleanup() {
        let clock = ManualClock::at_ms(1_000);
        let m = manager(ContextConfig::default(), &clock);
        m.add_context("one two three", Metadata::new()).await.unwrap();
        m.add_context_to("archived", Metadata::new(), Tier::LongTerm)
            .await
            .unwrap();

        let status = m.status();
        assert_eq!(status.metrics.tier(Tier::Active).map(|t| t.bytes), Some(13));
        assert!(status.memory_bytes >= 13);
        assert_eq!(status.last_cleanup_ms, None);

        clock.advance_secs(5);
        m.optimize().await.unwrap();
        assert_eq!(m.status().last_cleanup_ms, Some(6_000));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let clock = ManualClock::at_ms(1_000);
        let m = manager(ContextConfig::default(), &clock);
        let other = m.clone();
        other.add_context("shared", Metadata::new()).await.unwrap();
        assert_eq!(m.len(), 1);
    }
}
