//! Placement scoring and candidate selection.
//!
//! Every demotion, promotion and retention decision ranks segments by the
//! same composite score:
//!
//! ```text
//! composite      = relevance_score × recency_weight(age)
//! recency_weight = 1 / (1 + age_secs / recency_decay_secs)
//! ```
//!
//! Eviction takes the lowest composite first; ties go to the earliest
//! recency, then the smaller id. With a fixed clock the order is fully
//! deterministic.

use crate::segment::{Segment, SegmentId, Tier};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Weight in `(0, 1]` that halves after `decay_secs` of inactivity.
pub fn recency_weight(age_ms: u64, decay_secs: u64) -> f64 {
    if decay_secs == 0 {
        return 1.0;
    }
    let age_secs = age_ms as f64 / 1000.0;
    1.0 / (1.0 + age_secs / decay_secs as f64)
}

pub fn composite_score(segment: &Segment, now_ms: u64, decay_secs: u64) -> f64 {
    segment.relevance_score * recency_weight(now_ms.saturating_sub(segment.recency), decay_secs)
}

/// A segment chosen for a transition, pinned to the state it was chosen in.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: SegmentId,
    pub tier: Tier,
    pub version: u64,
    pub score: f64,
    pub recency: u64,
    /// Resident tokens at selection time.
    pub tokens: usize,
}

impl Candidate {
    pub fn of(segment: &Segment, now_ms: u64, decay_secs: u64) -> Self {
        Self {
            id: segment.id.clone(),
            tier: segment.tier,
            version: segment.version,
            score: composite_score(segment, now_ms, decay_secs),
            recency: segment.recency,
            tokens: segment.resident_tokens(),
        }
    }
}

/// Lowest score first, then earliest recency, then smaller id.
pub fn eviction_order(a: &Candidate, b: &Candidate) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then(a.recency.cmp(&b.recency))
        .then(a.id.cmp(&b.id))
}

/// All segments of a tier in eviction order, minus `exclude`.
pub fn ranked_for_eviction<'a>(
    segments: impl Iterator<Item = &'a Segment>,
    now_ms: u64,
    decay_secs: u64,
    exclude: &HashSet<SegmentId>,
) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = segments
        .filter(|s| !exclude.contains(&s.id))
        .map(|s| Candidate::of(s, now_ms, decay_secs))
        .collect();
    out.sort_by(eviction_order);
    out
}

/// The shortest eviction-order prefix that frees at least `need` tokens,
/// or `None` if every eligible segment together is not enough.
pub fn select_for_eviction<'a>(
    segments: impl Iterator<Item = &'a Segment>,
    now_ms: u64,
    decay_secs: u64,
    need: usize,
    exclude: &HashSet<SegmentId>,
) -> Option<Vec<Candidate>> {
    if need == 0 {
        return Some(Vec::new());
    }
    let mut freed = 0;
    let mut chosen = Vec::new();
    for c in ranked_for_eviction(segments, now_ms, decay_secs, exclude) {
        freed += c.tokens;
        chosen.push(c);
        if freed >= need {
            return Some(chosen);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Metadata;

    fn seg(id: &str, tokens: usize, recency: u64, relevance: f64) -> Segment {
        let mut s = Segment::new(id.into(), "x".into(), tokens, Tier::Active, recency, Metadata::new());
        s.relevance_score = relevance;
        s
    }

    #[test]
    fn recency_weight_halves_after_decay() {
        assert_eq!(recency_weight(0, 3600), 1.0);
        assert!((recency_weight(3_600_000, 3600) - 0.5).abs() < 1e-12);
        assert_eq!(recency_weight(1_000_000, 0), 1.0);
    }

    #[test]
    fn older_segment_scores_lower() {
        let now = 7_200_000;
        let old = seg("old", 1, 0, 1.0);
        let new = seg("new", 1, now, 1.0);
        assert!(composite_score(&old, now, 3600) < composite_score(&new, now, 3600));
    }

    #[test]
    fn ties_break_on_recency_then_id() {
        let segs = [seg("b", 1, 5, 1.0), seg("a", 1, 5, 1.0), seg("c", 1, 5, 0.5)];
        let order: Vec<_> = ranked_for_eviction(segs.iter(), 5, 3600, &HashSet::new())
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(order, vec!["c".into(), "a".into(), "b".into()] as Vec<SegmentId>);
    }

    #[test]
    fn selects_just_enough() {
        let segs = [seg("a", 40, 1, 1.0), seg("b", 40, 2, 1.0), seg("c", 40, 3, 1.0)];
        let chosen = select_for_eviction(segs.iter(), 3, 3600, 20, &HashSet::new()).unwrap();
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].id.as_str(), "a");

        let chosen = select_for_eviction(segs.iter(), 3, 3600, 41, &HashSet::new()).unwrap();
        assert_eq!(chosen.len(), 2);
    }

    #[test]
    fn exclusions_can_make_selection_impossible() {
        let segs = [seg("a", 40, 1, 1.0)];
        let exclude: HashSet<SegmentId> = ["a".into()].into_iter().collect();
        assert!(select_for_eviction(segs.iter(), 1, 3600, 10, &exclude).is_none());
        assert_eq!(
            select_for_eviction(segs.iter(), 1, 3600, 0, &exclude),
            Some(vec![])
        );
    }
}
