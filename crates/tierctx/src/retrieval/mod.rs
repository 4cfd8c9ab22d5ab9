//! Retrieval engine: rank segments against a query.
//!
//! Similarity is computed by one of three strategies:
//!
//! | Strategy | Similarity |
//! |---|---|
//! | `Keyword` | fraction of query terms present in the segment |
//! | `Semantic` | cosine of embeddings from the [`EmbeddingBackend`] |
//! | `Hybrid` | `w·keyword + (1−w)·semantic` |
//!
//! Candidates below the similarity threshold are dropped; the rest are
//! ranked by `similarity × recency_weight(age)`. The engine never touches
//! the store. Callers snapshot candidates under the store lock, rank them
//! here with no lock held, and apply side effects afterwards.

pub mod embedding;
pub mod keyword;

use crate::error::{ContextError, Result};
use crate::segment::SegmentId;
use crate::text;
use crate::tier::policy::recency_weight;
use embedding::{EmbeddingBackend, EmbeddingCache};
use keyword::KeywordQuery;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

/// Retrieval strategy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    Keyword,
    Semantic,
    #[default]
    Hybrid,
}

impl RetrievalStrategy {
    fn uses_keywords(self) -> bool {
        matches!(self, RetrievalStrategy::Keyword | RetrievalStrategy::Hybrid)
    }

    fn uses_embeddings(self) -> bool {
        matches!(self, RetrievalStrategy::Semantic | RetrievalStrategy::Hybrid)
    }
}

/// A segment snapshot offered for ranking.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: SegmentId,
    pub version: u64,
    pub recency: u64,
    pub content: String,
}

/// A candidate that passed the similarity threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub id: SegmentId,
    pub similarity: f64,
    /// `similarity × recency_weight`.
    pub score: f64,
    pub recency: u64,
}

/// Ranks candidates against a query.
#[derive(Debug)]
pub struct RetrievalEngine {
    strategy: RetrievalStrategy,
    similarity_threshold: f64,
    keyword_weight: f64,
    recency_decay_secs: u64,
    backend: Arc<dyn EmbeddingBackend>,
    cache: Mutex<EmbeddingCache>,
}

impl RetrievalEngine {
    pub fn new(
        strategy: RetrievalStrategy,
        similarity_threshold: f64,
        keyword_weight: f64,
        recency_decay_secs: u64,
        backend: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        Self {
            strategy,
            similarity_threshold,
            keyword_weight,
            recency_decay_secs,
            backend,
            cache: Mutex::new(EmbeddingCache::default()),
        }
    }

    pub fn strategy(&self) -> RetrievalStrategy {
        self.strategy
    }

    /// Rank `candidates`, best first, keeping at most `limit`.
    pub async fn rank(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        now_ms: u64,
        limit: usize,
    ) -> Result<Vec<Ranked>> {
        if query.trim().is_empty() {
            return Err(ContextError::EmptyQuery);
        }
        if candidates.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let keyword: Vec<f64> = if self.strategy.uses_keywords() {
            let q = KeywordQuery::parse(query);
            candidates.iter().map(|c| q.score(&c.content)).collect()
        } else {
            Vec::new()
        };
        let semantic: Vec<f64> = if self.strategy.uses_embeddings() {
            self.semantic_scores(query, &candidates).await?
        } else {
            Vec::new()
        };

        let w = self.keyword_weight;
        let mut ranked: Vec<Ranked> = candidates
            .into_iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let similarity = match self.strategy {
                    RetrievalStrategy::Keyword => keyword[i],
                    RetrievalStrategy::Semantic => semantic[i],
                    RetrievalStrategy::Hybrid => w * keyword[i] + (1.0 - w) * semantic[i],
                };
                if similarity < self.similarity_threshold || similarity <= 0.0 {
                    return None;
                }
                let age_ms = now_ms.saturating_sub(c.recency);
                Some(Ranked {
                    score: similarity * recency_weight(age_ms, self.recency_decay_secs),
                    similarity,
                    recency: c.recency,
                    id: c.id,
                })
            })
            .collect();

        ranked.sort_by(rank_order);
        ranked.truncate(limit);
        debug!(
            "[retrieval] {:?} query {:?}: {} result(s)",
            self.strategy,
            query.chars().take(60).collect::<String>(),
            ranked.len()
        );
        Ok(ranked)
    }

    /// Semantic similarity per candidate. Embeddings are served from the
    /// cache when the segment version is unchanged; the rest are fetched in
    /// one backend call with no lock held.
    async fn semantic_scores(&self, query: &str, candidates: &[Candidate]) -> Result<Vec<f64>> {
        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(candidates.len());
        let mut missing: Vec<usize> = Vec::new();
        {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            for (i, c) in candidates.iter().enumerate() {
                let hit = cache.get(&c.id, c.version).map(<[f32]>::to_vec);
                if hit.is_none() {
                    missing.push(i);
                }
                vectors.push(hit);
            }
        }

        let mut texts = Vec::with_capacity(missing.len() + 1);
        texts.push(query.to_string());
        texts.extend(missing.iter().map(|i| candidates[*i].content.clone()));
        trace!(
            "[retrieval] embedding {} text(s) via {}",
            texts.len(),
            self.backend.name()
        );
        let mut fresh = self.backend.embed(&texts).await?;
        if fresh.len() != texts.len() {
            return Err(ContextError::backend(format!(
                "{} returned {} embeddings for {} inputs",
                self.backend.name(),
                fresh.len(),
                texts.len()
            )));
        }
        let query_vec = fresh.remove(0);

        {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            for (i, v) in missing.iter().zip(fresh) {
                let c = &candidates[*i];
                cache.put(c.id.clone(), c.version, v.clone());
                vectors[*i] = Some(v);
            }
        }

        Ok(vectors
            .iter()
            .map(|v| {
                v.as_deref()
                    .map_or(0.0, |v| text::dense_cosine(&query_vec, v))
            })
            .collect())
    }

    /// Drop a removed segment's cached embedding.
    pub fn forget(&self, id: &SegmentId) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// Embedding cache `(hits, misses)`.
    pub fn cache_stats(&self) -> (u64, u64) {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        (cache.hits(), cache.misses())
    }
}

/// Higher score first, then higher similarity, more recent, smaller id.
fn rank_order(a: &Ranked, b: &Ranked) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(b.similarity.total_cmp(&a.similarity))
        .then(b.recency.cmp(&a.recency))
        .then(a.id.cmp(&b.id))
}
