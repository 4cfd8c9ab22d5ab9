//! Embedding backends and the per-segment embedding cache.
//!
//! Backends are external collaborators, so they are trait objects. Two ship
//! with the crate:
//!
//! - [`HashingEmbedder`]: deterministic feature hashing, no I/O. The default.
//! - [`HttpEmbedder`]: any OpenAI-compatible `/embeddings` endpoint.

use crate::error::{ContextError, Result};
use crate::segment::SegmentId;
use crate::text;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Boxed future returned by [`EmbeddingBackend::embed`].
pub type EmbedFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>>> + Send + 'a>>;

/// Turns text into dense vectors.
pub trait EmbeddingBackend: Send + Sync + fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Embed each text. The result has one vector per input, in order.
    fn embed<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a>;
}

// ── Hashing ────────────────────────────────────────────────────────

/// Default number of hashing buckets.
pub const DEFAULT_HASH_DIMENSIONS: usize = 256;

/// Feature-hashing embedder: each term is hashed into a bucket with a
/// hashed sign, and the vector is L2-normalized. Same text, same vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_one(&self, content: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for term in text::terms(content) {
            let h = fnv1a(term.as_bytes());
            let bucket = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSIONS)
    }
}

impl EmbeddingBackend for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn embed<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a> {
        let vectors = texts.iter().map(|t| self.embed_one(t)).collect();
        Box::pin(std::future::ready(Ok(vectors)))
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

// ── HTTP ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Client for an OpenAI-compatible embeddings endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl fmt::Debug for HttpEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpEmbedder")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpEmbedder {
    /// `base_url` is the API root, e.g. `https://api.openai.com/v1`.
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("tierctx/0.1")
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ContextError::backend(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        debug!(
            "[embed] request: model={}, inputs={}",
            self.model,
            texts.len()
        );
        let start = Instant::now();

        let mut req = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        let resp = req
            .send()
            .await
            .map_err(|e| ContextError::backend(format!("embedding request failed: {e}")))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ContextError::backend(format!("failed to read response: {e}")))?;
        debug!(
            "[embed] response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(ContextError::backend(format!(
                "embeddings API HTTP {status}: {text}"
            )));
        }
        parse_response(&text, texts.len())
    }
}

impl EmbeddingBackend for HttpEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    fn embed<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a> {
        Box::pin(self.request(texts))
    }
}

/// Parse an embeddings response body, restoring input order.
fn parse_response(body: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
    let parsed: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| ContextError::backend(format!("failed to parse response: {e}")))?;
    if let Some(err) = parsed.error {
        return Err(ContextError::backend(format!(
            "embeddings API error: {}",
            err.message
        )));
    }
    if parsed.data.len() != expected {
        return Err(ContextError::backend(format!(
            "expected {expected} embeddings, got {}",
            parsed.data.len()
        )));
    }
    let mut data = parsed.data;
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

// ── Cache ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CacheEntry {
    version: u64,
    vector: Vec<f32>,
    inserted: u64,
}

/// Embeddings keyed by segment id, valid for one segment version.
///
/// A lookup with a newer version is a miss; the stale entry is replaced on
/// the next `put`.
#[derive(Debug)]
pub struct EmbeddingCache {
    entries: HashMap<SegmentId, CacheEntry>,
    max_entries: usize,
    seq: u64,
    hits: u64,
    misses: u64,
}

impl EmbeddingCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            seq: 0,
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, id: &SegmentId, version: u64) -> Option<&[f32]> {
        match self.entries.get(id) {
            Some(entry) if entry.version == version => {
                self.hits += 1;
                Some(&entry.vector)
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, id: SegmentId, version: u64, vector: Vec<f32>) {
        if !self.entries.contains_key(&id) && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        self.seq += 1;
        self.entries.insert(
            id,
            CacheEntry {
                version,
                vector,
                inserted: self.seq,
            },
        );
    }

    pub fn remove(&mut self, id: &SegmentId) {
        self.entries.remove(id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.inserted)
            .map(|(k, _)| k.clone())
        {
            trace!("[embed] cache evict {}", oldest);
            self.entries.remove(&oldest);
        }
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(4096)
    }
}
