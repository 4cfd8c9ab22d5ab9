//! Segments: the atomic unit of context, and the tiers they live in.

use crate::compression::CompressedContent;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Caller-supplied key/value metadata. Opaque to the core except for the
/// [`CONTENT_TYPE_KEY`] entry.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key used to select a compression strategy per content type.
pub const CONTENT_TYPE_KEY: &str = "type";

/// Relevance assigned to newly added content.
pub const INITIAL_RELEVANCE: f64 = 1.0;

/// Relevance added each time a segment is promoted.
pub const PROMOTION_BOOST: f64 = 0.5;

// ── Ids ────────────────────────────────────────────────────────────

/// Unique, immutable segment identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    /// Build an id from a timestamp and a per-manager counter. Fixed-width
    /// hex keeps lexicographic order equal to creation order.
    pub(crate) fn generate(now_ms: u64, counter: u64) -> Self {
        Self(format!("seg-{now_ms:012x}-{counter:06x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SegmentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SegmentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Tiers ──────────────────────────────────────────────────────────

/// Memory tier, ordered from hottest to coldest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Decompressed content that goes into the prompt.
    Active,
    /// Overflow from Active; may be compressed.
    Working,
    /// Compressed archive.
    LongTerm,
}

impl Tier {
    /// All tiers, hottest first.
    pub const ALL: [Tier; 3] = [Tier::Active, Tier::Working, Tier::LongTerm];

    pub(crate) fn index(self) -> usize {
        match self {
            Tier::Active => 0,
            Tier::Working => 1,
            Tier::LongTerm => 2,
        }
    }

    /// The tier a segment is demoted into, if any.
    pub fn colder(self) -> Option<Tier> {
        match self {
            Tier::Active => Some(Tier::Working),
            Tier::Working => Some(Tier::LongTerm),
            Tier::LongTerm => None,
        }
    }

    /// The tier a segment is promoted into, if any.
    pub fn warmer(self) -> Option<Tier> {
        match self {
            Tier::Active => None,
            Tier::Working => Some(Tier::Active),
            Tier::LongTerm => Some(Tier::Working),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Active => "active",
            Tier::Working => "working",
            Tier::LongTerm => "long_term",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Segment ────────────────────────────────────────────────────────

/// Resident form of a segment's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentBody {
    Raw(String),
    Compressed(CompressedContent),
}

/// A unit of context plus the bookkeeping the tier policy needs.
///
/// Segments handed to callers are snapshots; mutating one does not affect
/// the store. Segments serialize with their body, so an exported segment
/// can be put back into a store unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    body: SegmentBody,
    /// Token count of the uncompressed content.
    pub token_count: usize,
    pub tier: Tier,
    pub relevance_score: f64,
    /// Millisecond timestamp of the last access.
    pub recency: u64,
    pub access_count: u64,
    /// Millisecond timestamp of creation; identifies this segment instance.
    pub created_at: u64,
    /// Bumped on every tier or body change.
    pub version: u64,
    pub metadata: Metadata,
    /// Every compression strategy was tried and none was acceptable.
    pub incompressible: bool,
}

impl Segment {
    pub fn new(
        id: SegmentId,
        content: String,
        token_count: usize,
        tier: Tier,
        now_ms: u64,
        metadata: Metadata,
    ) -> Self {
        Self {
            id,
            body: SegmentBody::Raw(content),
            token_count,
            tier,
            relevance_score: INITIAL_RELEVANCE,
            recency: now_ms,
            access_count: 0,
            created_at: now_ms,
            version: 0,
            metadata,
            incompressible: false,
        }
    }

    /// Usable text: the raw content, or the decompressed rendering.
    pub fn content(&self) -> Cow<'_, str> {
        match &self.body {
            SegmentBody::Raw(text) => Cow::Borrowed(text),
            SegmentBody::Compressed(c) => Cow::Owned(c.render()),
        }
    }

    pub fn body(&self) -> &SegmentBody {
        &self.body
    }

    /// Raw text when the segment is not compressed.
    pub fn raw_text(&self) -> Option<&str> {
        match &self.body {
            SegmentBody::Raw(text) => Some(text),
            SegmentBody::Compressed(_) => None,
        }
    }

    pub fn compressed_form(&self) -> Option<&CompressedContent> {
        match &self.body {
            SegmentBody::Raw(_) => None,
            SegmentBody::Compressed(c) => Some(c),
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.body, SegmentBody::Compressed(_))
    }

    /// Tokens this segment currently occupies in its tier.
    pub fn resident_tokens(&self) -> usize {
        match &self.body {
            SegmentBody::Raw(_) => self.token_count,
            SegmentBody::Compressed(c) => c.compressed_tokens,
        }
    }

    /// Bytes the body occupies in its current form.
    pub fn resident_bytes(&self) -> usize {
        match &self.body {
            SegmentBody::Raw(text) => text.len(),
            SegmentBody::Compressed(c) => c.resident_bytes(),
        }
    }

    /// The caller's content-type tag, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.metadata.get(CONTENT_TYPE_KEY).map(String::as_str)
    }

    /// Replace the body. `token_count` is the uncompressed size of the new
    /// content. Clears the incompressible mark.
    pub(crate) fn set_body(&mut self, body: SegmentBody, token_count: usize) {
        self.body = body;
        self.token_count = token_count;
        self.incompressible = false;
        self.version += 1;
    }

    pub(crate) fn set_tier(&mut self, tier: Tier) {
        self.tier = tier;
        self.version += 1;
    }

    /// Record an access. Recency never moves backwards.
    pub(crate) fn touch(&mut self, now_ms: u64) {
        self.recency = self.recency.max(now_ms);
        self.access_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_sort_by_creation() {
        let a = SegmentId::generate(5, 1);
        let b = SegmentId::generate(5, 2);
        let c = SegmentId::generate(6, 0);
        assert!(a < b && b < c);
        assert_eq!(a.as_str(), "seg-000000000005-000001");
    }

    #[test]
    fn tier_neighbours() {
        assert_eq!(Tier::Active.colder(), Some(Tier::Working));
        assert_eq!(Tier::LongTerm.colder(), None);
        assert_eq!(Tier::LongTerm.warmer(), Some(Tier::Working));
        assert_eq!(Tier::Active.warmer(), None);
        assert_eq!(Tier::LongTerm.to_string(), "long_term");
    }

    #[test]
    fn new_segment_is_raw_and_active() {
        let mut meta = Metadata::new();
        meta.insert(CONTENT_TYPE_KEY.into(), "code".into());
        let seg = Segment::new("s".into(), "hello world".into(), 2, Tier::Active, 10, meta);
        assert_eq!(seg.content(), "hello world");
        assert_eq!(seg.resident_tokens(), 2);
        assert_eq!(seg.relevance_score, INITIAL_RELEVANCE);
        assert_eq!(seg.content_type(), Some("code"));
        assert!(!seg.is_compressed());
    }

    #[test]
    fn touch_never_moves_recency_backwards() {
        let mut seg = Segment::new("s".into(), "x".into(), 1, Tier::Active, 100, Metadata::new());
        seg.touch(50);
        assert_eq!(seg.recency, 100);
        seg.touch(200);
        assert_eq!(seg.recency, 200);
        assert_eq!(seg.access_count, 2);
    }
}
