//! Segment store: keyed storage plus per-tier recency indices.
//!
//! Pure data structure, no policy. Every mutation goes through [`put`],
//! [`modify`], [`touch`] or [`delete`] so the tier index and per-tier token
//! totals never drift from the segments themselves.
//!
//! [`put`]: SegmentStore::put
//! [`modify`]: SegmentStore::modify
//! [`touch`]: SegmentStore::touch
//! [`delete`]: SegmentStore::delete

use crate::error::{ContextError, Result};
use crate::segment::{Segment, SegmentId, Tier};
use std::collections::{BTreeSet, HashMap};

/// In-memory segment store.
#[derive(Debug, Default)]
pub struct SegmentStore {
    segments: HashMap<SegmentId, Segment>,
    /// `(recency, id)` per tier, oldest first.
    index: [BTreeSet<(u64, SegmentId)>; 3],
    /// Resident tokens per tier.
    tokens: [usize; 3],
    /// Deleting a missing id is an error rather than a no-op.
    strict_delete: bool,
}

impl SegmentStore {
    /// A store whose `delete` fails with `NotFound` on a missing id.
    pub fn new() -> Self {
        Self {
            strict_delete: true,
            ..Default::default()
        }
    }

    /// Choose whether deleting a missing id is an error.
    pub fn with_strict_delete(mut self, strict: bool) -> Self {
        self.strict_delete = strict;
        self
    }

    /// Store a segment.
    ///
    /// Re-putting the same segment instance (same id and `created_at`)
    /// overwrites it. A different instance with a taken id is rejected.
    pub fn put(&mut self, segment: Segment) -> Result<()> {
        if let Some(existing) = self.segments.get(&segment.id) {
            if existing.created_at != segment.created_at {
                return Err(ContextError::DuplicateId(segment.id));
            }
            let (tier, recency, tokens) = (existing.tier, existing.recency, existing.resident_tokens());
            self.unindex(tier, recency, tokens, &segment.id);
        }
        self.reindex(segment.tier, segment.recency, segment.resident_tokens(), &segment.id);
        self.segments.insert(segment.id.clone(), segment);
        Ok(())
    }

    pub fn get(&self, id: &SegmentId) -> Result<&Segment> {
        self.segments
            .get(id)
            .ok_or_else(|| ContextError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &SegmentId) -> bool {
        self.segments.contains_key(id)
    }

    /// Remove a segment. A missing id is `NotFound` in strict mode and
    /// `Ok(None)` otherwise.
    pub fn delete(&mut self, id: &SegmentId) -> Result<Option<Segment>> {
        match self.segments.remove(id) {
            Some(seg) => {
                self.unindex(seg.tier, seg.recency, seg.resident_tokens(), id);
                Ok(Some(seg))
            }
            None if self.strict_delete => Err(ContextError::NotFound(id.clone())),
            None => Ok(None),
        }
    }

    /// Ids in `tier`, oldest recency first.
    ///
    /// Borrowed from the live index: calling again after a mutation
    /// reflects the new state.
    pub fn list_by_tier(&self, tier: Tier) -> impl Iterator<Item = &SegmentId> + '_ {
        self.index[tier.index()].iter().map(|(_, id)| id)
    }

    /// Segments in `tier`, oldest recency first.
    pub fn segments_in(&self, tier: Tier) -> impl Iterator<Item = &Segment> + '_ {
        self.list_by_tier(tier)
            .filter_map(|id| self.segments.get(id))
    }

    /// All segments, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.segments.values()
    }

    /// Apply `f` to a segment and refresh its index entries.
    ///
    /// `f` must not change the segment's id.
    pub fn modify<R>(&mut self, id: &SegmentId, f: impl FnOnce(&mut Segment) -> R) -> Result<R> {
        let seg = self
            .segments
            .get_mut(id)
            .ok_or_else(|| ContextError::NotFound(id.clone()))?;
        let before = (seg.tier, seg.recency, seg.resident_tokens());
        let out = f(seg);
        debug_assert_eq!(&seg.id, id, "segment ids are immutable");
        let after = (seg.tier, seg.recency, seg.resident_tokens());

        if before != after {
            self.unindex(before.0, before.1, before.2, id);
            self.reindex(after.0, after.1, after.2, id);
        }
        Ok(out)
    }

    /// Record an access at `now_ms`.
    pub fn touch(&mut self, id: &SegmentId, now_ms: u64) -> Result<()> {
        self.modify(id, |seg| seg.touch(now_ms))
    }

    /// Resident tokens in `tier`.
    pub fn tier_tokens(&self, tier: Tier) -> usize {
        self.tokens[tier.index()]
    }

    /// Number of segments in `tier`.
    pub fn tier_len(&self, tier: Tier) -> usize {
        self.index[tier.index()].len()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Check that every segment has exactly one index entry in its own tier
    /// and that token totals match. Returns a description of the first
    /// violation.
    pub fn verify(&self) -> std::result::Result<(), String> {
        let indexed: usize = self.index.iter().map(BTreeSet::len).sum();
        if indexed != self.segments.len() {
            return Err(format!(
                "{indexed} index entries for {} segments",
                self.segments.len()
            ));
        }
        let mut tokens = [0usize; 3];
        for seg in self.segments.values() {
            for tier in Tier::ALL {
                let present = self.index[tier.index()].contains(&(seg.recency, seg.id.clone()));
                if present != (tier == seg.tier) {
                    return Err(format!("{} misindexed in {tier} tier", seg.id));
                }
            }
            if seg.tier == Tier::Active && seg.is_compressed() {
                return Err(format!("{} is compressed in the active tier", seg.id));
            }
            tokens[seg.tier.index()] += seg.resident_tokens();
        }
        if tokens != self.tokens {
            return Err(format!(
                "token totals {:?} disagree with segments {:?}",
                self.tokens, tokens
            ));
        }
        Ok(())
    }

    fn unindex(&mut self, tier: Tier, recency: u64, tokens: usize, id: &SegmentId) {
        self.index[tier.index()].remove(&(recency, id.clone()));
        self.tokens[tier.index()] -= tokens;
    }

    fn reindex(&mut self, tier: Tier, recency: u64, tokens: usize, id: &SegmentId) {
        self.index[tier.index()].insert((recency, id.clone()));
        self.tokens[tier.index()] += tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Metadata;

    fn seg(id: &str, tokens: usize, tier: Tier, at: u64) -> Segment {
        Segment::new(id.into(), format!("content of {id}"), tokens, tier, at, Metadata::new())
    }

    #[test]
    fn put_get_delete() {
        let mut store = SegmentStore::new();
        store.put(seg("a", 10, Tier::Active, 1)).unwrap();
        assert_eq!(store.get(&"a".into()).unwrap().token_count, 10);
        assert_eq!(store.tier_tokens(Tier::Active), 10);

        let removed = store.delete(&"a".into()).unwrap();
        assert!(removed.is_some());
        assert!(store.is_empty());
        assert_eq!(store.tier_tokens(Tier::Active), 0);
        assert!(matches!(
            store.get(&"a".into()),
            Err(ContextError::NotFound(_))
        ));
        store.verify().unwrap();
    }

    #[test]
    fn delete_missing_respects_policy() {
        let mut strict = SegmentStore::new();
        assert!(matches!(
            strict.delete(&"nope".into()),
            Err(ContextError::NotFound(_))
        ));
        let mut lenient = SegmentStore::new().with_strict_delete(false);
        assert_eq!(lenient.delete(&"nope".into()).unwrap(), None);
    }

    #[test]
    fn exported_segment_round_trips_into_a_store() {
        use crate::compression::{CompressionEngine, CompressionStrategy};
        use crate::segment::SegmentBody;
        use crate::tokenizer::WhitespaceTokenizer;
        use std::sync::Arc;

        let engine = CompressionEngine::new(
            CompressionStrategy::Lossless,
            0.3,
            0.8,
            Arc::new(WhitespaceTokenizer),
        );
        let content = "disk full on node 7\ndisk full on node 7\nretrying";
        let outcome = engine.compress_with(CompressionStrategy::Lossless, content, 0.3);
        let mut original = seg("lt", 11, Tier::LongTerm, 40);
        original.set_body(SegmentBody::Compressed(outcome.compressed), 11);
        original.metadata.insert("source".into(), "ops.log".into());
        original.relevance_score = 1.75;

        let json = serde_json::to_string(&original).unwrap();
        let restored: Segment = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);
        assert_eq!(restored.content(), content);

        let mut store = SegmentStore::new();
        store.put(restored).unwrap();
        assert_eq!(store.get(&"lt".into()).unwrap(), &original);
        assert_eq!(store.tier_tokens(Tier::LongTerm), original.resident_tokens());
        store.verify().unwrap();
    }

    #[test]
    fn put_same_instance_overwrites() {
        let mut store = SegmentStore::new();
        let mut s = seg("a", 10, Tier::Active, 1);
        store.put(s.clone()).unwrap();
        s.token_count = 25;
        s.tier = Tier::Working;
        store.put(s).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.tier_tokens(Tier::Active), 0);
        assert_eq!(store.tier_tokens(Tier::Working), 25);
        store.verify().unwrap();
    }

    #[test]
    fn put_colliding_instance_is_rejected() {
        let mut store = SegmentStore::new();
        store.put(seg("a", 10, Tier::Active, 1)).unwrap();
        let err = store.put(seg("a", 3, Tier::Active, 2)).unwrap_err();
        assert_eq!(err, ContextError::DuplicateId("a".into()));
        assert_eq!(store.get(&"a".into()).unwrap().token_count, 10);
    }

    #[test]
    fn list_by_tier_is_oldest_first_and_live() {
        let mut store = SegmentStore::new();
        store.put(seg("c", 1, Tier::Active, 30)).unwrap();
        store.put(seg("a", 1, Tier::Active, 10)).unwrap();
        store.put(seg("b", 1, Tier::Active, 20)).unwrap();
        store.put(seg("w", 1, Tier::Working, 5)).unwrap();

        let ids: Vec<_> = store.list_by_tier(Tier::Active).cloned().collect();
        assert_eq!(ids, vec!["a".into(), "b".into(), "c".into()] as Vec<SegmentId>);

        store.touch(&"a".into(), 40).unwrap();
        let ids: Vec<_> = store.list_by_tier(Tier::Active).cloned().collect();
        assert_eq!(ids, vec!["b".into(), "c".into(), "a".into()] as Vec<SegmentId>);
        assert_eq!(store.tier_len(Tier::Working), 1);
    }

    #[test]
    fn modify_moves_between_tiers() {
        let mut store = SegmentStore::new();
        store.put(seg("a", 7, Tier::Active, 1)).unwrap();
        store
            .modify(&"a".into(), |s| s.set_tier(Tier::LongTerm))
            .unwrap();
        assert_eq!(store.tier_tokens(Tier::Active), 0);
        assert_eq!(store.tier_tokens(Tier::LongTerm), 7);
        assert_eq!(store.list_by_tier(Tier::LongTerm).count(), 1);
        store.verify().unwrap();
    }
}
