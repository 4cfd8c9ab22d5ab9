//! Tier manager: capacity invariants and segment movement between tiers.
//!
//! ```text
//!            add ──► Active ◄──── promote ──── Working ◄──── promote ──── LongTerm ──► removed
//!                       └──── demote ─────────►   └──── demote ─────────►     (retention)
//! ```
//!
//! Every decision follows the same optimistic pattern:
//!
//! 1. Under the store lock, select candidates by composite score and pin
//!    each to the `(tier, version)` it was selected in.
//! 2. With the lock released, compress the candidates that need it on the
//!    blocking pool.
//! 3. Re-acquire the lock. If any candidate moved or changed, discard the
//!    work and select again, up to `max_conflict_retries` times. Otherwise
//!    apply every move at once.
//!
//! The lock is never held across an `.await`, so dropping an in-flight
//! future leaves the store consistent.

pub mod policy;

use crate::clock::{Clock, format_ms};
use crate::compression::{CompressionEngine, CompressionOutcome};
use crate::config::{ContextConfig, LongTermRetention};
use crate::error::{ContextError, Result};
use crate::metrics::{MetricsCollector, OptimizationSummary, TierStats};
use crate::retrieval::{Candidate as RetrievalCandidate, Ranked};
use crate::segment::{PROMOTION_BOOST, Segment, SegmentBody, SegmentId, Tier};
use crate::store::SegmentStore;
use policy::Candidate;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, trace, warn};

/// Capacity and placement limits derived from [`ContextConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct TierLimits {
    pub active_capacity_tokens: usize,
    pub working_capacity_tokens: usize,
    pub retention: LongTermRetention,
    pub inline_threshold_tokens: usize,
    pub recency_decay_secs: u64,
    pub max_conflict_retries: u32,
}

impl TierLimits {
    pub fn from_config(config: &ContextConfig) -> Self {
        Self {
            active_capacity_tokens: config.active_capacity_tokens,
            working_capacity_tokens: config.working_capacity_tokens(),
            retention: config.longterm_retention,
            inline_threshold_tokens: config.inline_threshold_tokens,
            recency_decay_secs: config.recency_decay_secs,
            max_conflict_retries: config.max_conflict_retries,
        }
    }

    /// Token capacity of `tier`; LongTerm is unbounded in tokens.
    pub fn capacity(&self, tier: Tier) -> Option<usize> {
        match tier {
            Tier::Active => Some(self.active_capacity_tokens),
            Tier::Working => Some(self.working_capacity_tokens),
            Tier::LongTerm => None,
        }
    }
}

/// A demotion selected under the lock.
#[derive(Debug)]
struct Move {
    candidate: Candidate,
    to: Tier,
    /// Content and content type to compress before the move.
    job: Option<(String, Option<String>)>,
    outcome: Option<CompressionOutcome>,
}

/// Owns the segment store and every transition between tiers.
#[derive(Debug)]
pub struct TierManager {
    store: Mutex<SegmentStore>,
    limits: TierLimits,
    compression: CompressionEngine,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsCollector>,
    /// Clock reading at the last retention pass.
    last_retention: Mutex<Option<u64>>,
}

impl TierManager {
    pub fn new(
        store: SegmentStore,
        limits: TierLimits,
        compression: CompressionEngine,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store: Mutex::new(store),
            limits,
            compression,
            clock,
            metrics,
            last_retention: Mutex::new(None),
        }
    }

    pub fn limits(&self) -> &TierLimits {
        &self.limits
    }

    pub fn compression(&self) -> &CompressionEngine {
        &self.compression
    }

    fn lock(&self) -> MutexGuard<'_, SegmentStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Snapshot of one segment.
    pub fn get(&self, id: &SegmentId) -> Result<Segment> {
        self.lock().get(id).cloned()
    }

    /// Snapshots of `ids` that still exist, in the given order.
    pub fn snapshot(&self, ids: &[SegmentId]) -> Vec<Segment> {
        let store = self.lock();
        ids.iter().filter_map(|id| store.get(id).ok().cloned()).collect()
    }

    /// Ids in `tier`, oldest recency first.
    pub fn ids_in(&self, tier: Tier) -> Vec<SegmentId> {
        self.lock().list_by_tier(tier).cloned().collect()
    }

    /// Every segment as a retrieval candidate.
    pub fn retrieval_candidates(&self) -> Vec<RetrievalCandidate> {
        let store = self.lock();
        let mut out: Vec<RetrievalCandidate> = store
            .iter()
            .map(|s| RetrievalCandidate {
                id: s.id.clone(),
                version: s.version,
                recency: s.recency,
                content: s.content().into_owned(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Millisecond timestamp of the last retention pass, if one has run.
    pub fn last_retention_ms(&self) -> Option<u64> {
        *self
            .last_retention
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Occupancy per tier, hottest first.
    pub fn tier_stats(&self) -> Vec<TierStats> {
        let store = self.lock();
        Tier::ALL
            .iter()
            .map(|&tier| {
                let tokens = store.tier_tokens(tier);
                let segments = store.tier_len(tier);
                let bytes = store.segments_in(tier).map(Segment::resident_bytes).sum();
                let (capacity, utilization) = match (tier, self.limits.retention) {
                    (Tier::LongTerm, LongTermRetention::MaxCount(n)) => {
                        (Some(n), segments as f64 / n.max(1) as f64)
                    }
                    (Tier::LongTerm, _) => (None, 0.0),
                    _ => {
                        let cap = self.limits.capacity(tier).unwrap_or(0);
                        (Some(cap), tokens as f64 / cap.max(1) as f64)
                    }
                };
                TierStats {
                    tier,
                    segments,
                    tokens,
                    bytes,
                    capacity,
                    utilization,
                }
            })
            .collect()
    }

    /// Check store consistency and the Active capacity invariant.
    pub fn verify(&self) -> std::result::Result<(), String> {
        let store = self.lock();
        store.verify()?;
        let active = store.tier_tokens(Tier::Active);
        if active > self.limits.active_capacity_tokens {
            return Err(format!(
                "active tier holds {active} tokens, capacity {}",
                self.limits.active_capacity_tokens
            ));
        }
        Ok(())
    }

    // ── Insertion and removal ──────────────────────────────────────

    /// Reject a segment that could never fit in `tier`.
    pub fn check_fits(&self, tier: Tier, tokens: usize) -> Result<()> {
        match self.limits.capacity(tier) {
            Some(capacity) if tokens > capacity => {
                Err(ContextError::SegmentTooLarge { tokens, capacity })
            }
            _ => Ok(()),
        }
    }

    /// Insert a new segment into its tier, demoting others to make room.
    pub async fn insert(&self, mut segment: Segment) -> Result<OptimizationSummary> {
        let tier = segment.tier;
        self.check_fits(tier, segment.resident_tokens())?;
        let mut summary = OptimizationSummary::default();

        if self.needs_compression(&segment, tier) {
            let outcome = self
                .compression
                .compress_detached(
                    segment.content().into_owned(),
                    segment.content_type().map(str::to_string),
                )
                .await?;
            if let Some(ratio) = self.apply_outcome(&mut segment, outcome) {
                self.record_compression(&mut summary, ratio);
            }
        }

        let id = segment.id.clone();
        let tokens = segment.resident_tokens();
        self.with_room(
            tier,
            &HashSet::new(),
            |_| Ok(tokens),
            |store| store.put(segment),
            &mut summary,
        )
        .await?;
        debug!("[tier] insert {} into {} ({} tokens)", id, tier, tokens);

        if tier == Tier::Active && summary.demotions > 0 {
            self.enforce_capacity(Tier::Working, &mut summary).await?;
        }
        self.metrics.record_transitions(summary);
        Ok(summary)
    }

    /// Remove a segment from whichever tier holds it.
    pub fn remove(&self, id: &SegmentId) -> Result<Option<Segment>> {
        let removed = self.lock().delete(id)?;
        if let Some(seg) = &removed {
            debug!("[tier] remove {} from {}", seg.id, seg.tier);
        }
        Ok(removed)
    }

    /// Replace a segment's content in place, keeping its tier.
    ///
    /// The body becomes raw again; Working and LongTerm segments are picked
    /// up by the next recompression pass.
    pub async fn update_content(
        &self,
        id: &SegmentId,
        content: String,
        token_count: usize,
    ) -> Result<Segment> {
        let tier = self.lock().get(id)?.tier;
        self.check_fits(tier, token_count)?;

        let exclude: HashSet<SegmentId> = [id.clone()].into_iter().collect();
        let mut summary = OptimizationSummary::default();
        let updated = self
            .with_room(
                tier,
                &exclude,
                |store| {
                    let seg = store.get(id)?;
                    if seg.tier != tier {
                        return Err(ContextError::ConcurrentModification { tier, attempts: 1 });
                    }
                    Ok(token_count.saturating_sub(seg.resident_tokens()))
                },
                |store| {
                    store.modify(id, |seg| {
                        seg.set_body(SegmentBody::Raw(content), token_count);
                        seg.clone()
                    })
                },
                &mut summary,
            )
            .await?;
        debug!("[tier] update {} in {} ({} tokens)", id, tier, token_count);

        if tier == Tier::Active && summary.demotions > 0 {
            self.enforce_capacity(Tier::Working, &mut summary).await?;
        }
        self.metrics.record_transitions(summary);
        Ok(updated)
    }

    // ── Retrieval side effects ─────────────────────────────────────

    /// Touch every returned segment and add its similarity to its
    /// relevance. Returns the ids that still exist.
    pub fn record_hits(&self, hits: &[Ranked]) -> Vec<SegmentId> {
        let now = self.clock.now_ms();
        let mut store = self.lock();
        hits.iter()
            .filter_map(|hit| {
                store
                    .modify(&hit.id, |seg| {
                        seg.touch(now);
                        seg.relevance_score += hit.similarity;
                    })
                    .ok()
                    .map(|()| hit.id.clone())
            })
            .collect()
    }

    /// Promote each segment one tier warmer. Best effort: a promotion that
    /// cannot be made to fit is skipped. Room is made by demoting one level
    /// down from the destination; the promoted segments themselves are never
    /// demoted for it.
    pub async fn promote(&self, ids: &[SegmentId]) -> OptimizationSummary {
        let exclude: HashSet<SegmentId> = ids.iter().cloned().collect();
        let mut summary = OptimizationSummary::default();
        for id in ids {
            if let Err(e) = self.promote_one(id, &exclude, &mut summary).await {
                debug!("[tier] promotion of {} skipped: {}", id, e);
            }
        }
        self.metrics.record_transitions(summary);
        summary
    }

    async fn promote_one(
        &self,
        id: &SegmentId,
        exclude: &HashSet<SegmentId>,
        summary: &mut OptimizationSummary,
    ) -> Result<()> {
        let (from, dest, tokens) = {
            let store = self.lock();
            let seg = store.get(id)?;
            let Some(dest) = seg.tier.warmer() else {
                return Ok(());
            };
            (seg.tier, dest, promoted_tokens(seg, dest))
        };
        self.check_fits(dest, tokens)?;

        let mut cascade = OptimizationSummary::default();
        let result = self
            .with_room(
                dest,
                exclude,
                |store| {
                    let seg = store.get(id)?;
                    if seg.tier != from {
                        return Err(ContextError::ConcurrentModification {
                            tier: from,
                            attempts: 1,
                        });
                    }
                    Ok(promoted_tokens(seg, dest))
                },
                |store| self.apply_promotion(store, id, dest, true, summary),
                &mut cascade,
            )
            .await;
        summary.absorb(cascade);
        result
    }

    fn apply_promotion(
        &self,
        store: &mut SegmentStore,
        id: &SegmentId,
        dest: Tier,
        boost: bool,
        summary: &mut OptimizationSummary,
    ) -> Result<()> {
        let seg = store.get(id)?;
        let from = seg.tier;
        let decompressed = match seg.compressed_form() {
            Some(c) if dest == Tier::Active => {
                Some((self.compression.decompress(c)?, c.rendered_tokens()))
            }
            _ => None,
        };
        store.modify(id, |seg| {
            if let Some((text, tokens)) = decompressed {
                seg.set_body(SegmentBody::Raw(text), tokens);
            }
            seg.set_tier(dest);
            if boost {
                seg.relevance_score += PROMOTION_BOOST;
            }
        })?;
        summary.promotions += 1;
        debug!("[tier] promote {} {} -> {}", id, from, dest);
        Ok(())
    }

    // ── Optimization ───────────────────────────────────────────────

    /// Rebalance all tiers. Returns the transitions made and the ids evicted
    /// by retention.
    ///
    /// Steps, in order: recompress pending segments, enforce Working
    /// capacity, apply LongTerm retention, fill free Active space from
    /// Working. Placement scores are computed against the clock at each
    /// step. Running it twice with nothing in between makes no transitions
    /// the second time.
    pub async fn optimize(&self) -> Result<(OptimizationSummary, Vec<SegmentId>)> {
        let mut summary = OptimizationSummary::default();
        self.recompress_pending(&mut summary).await?;
        self.enforce_capacity(Tier::Working, &mut summary).await?;
        let evicted = self.apply_retention(&mut summary)?;
        self.fill_active(&mut summary).await;

        info!(
            "[tier] optimize: {} promotion(s), {} demotion(s), {} eviction(s), {} compression(s)",
            summary.promotions, summary.demotions, summary.evictions, summary.compressions
        );
        self.metrics.record_transitions(summary);
        Ok((summary, evicted))
    }

    /// Compress one Working or LongTerm segment now, regardless of earlier
    /// failed attempts.
    pub async fn compress_segment(&self, id: &SegmentId) -> Result<CompressionOutcome> {
        let (tier, version, content, content_type, existing) = {
            let store = self.lock();
            let seg = store.get(id)?;
            if seg.tier == Tier::Active {
                return Err(ContextError::ActiveSegment(id.clone()));
            }
            (
                seg.tier,
                seg.version,
                seg.content().into_owned(),
                seg.content_type().map(str::to_string),
                seg.compressed_form().cloned(),
            )
        };
        if let Some(compressed) = existing {
            let below_threshold = self
                .compression
                .misses_threshold(&compressed, self.compression.target_ratio());
            return Ok(CompressionOutcome {
                compressed,
                below_threshold,
            });
        }

        let outcome = self.compression.compress_detached(content, content_type).await?;
        let mut summary = OptimizationSummary::default();
        {
            let mut store = self.lock();
            let current = store.get(id)?;
            if (current.tier, current.version) != (tier, version) {
                return Err(ContextError::ConcurrentModification { tier, attempts: 1 });
            }
            let applied = store.modify(id, |seg| self.apply_outcome(seg, outcome.clone()))?;
            if let Some(ratio) = applied {
                self.record_compression(&mut summary, ratio);
            }
        }
        self.metrics.record_transitions(summary);
        Ok(outcome)
    }

    async fn recompress_pending(&self, summary: &mut OptimizationSummary) -> Result<()> {
        let jobs: Vec<(SegmentId, u64, String, Option<String>)> = {
            let store = self.lock();
            let mut jobs: Vec<_> = store
                .iter()
                .filter(|s| self.needs_compression(s, s.tier))
                .map(|s| {
                    (
                        s.id.clone(),
                        s.version,
                        s.content().into_owned(),
                        s.content_type().map(str::to_string),
                    )
                })
                .collect();
            jobs.sort_by(|a, b| a.0.cmp(&b.0));
            jobs
        };

        for (id, version, content, content_type) in jobs {
            let outcome = self.compression.compress_detached(content, content_type).await?;
            {
                let mut store = self.lock();
                let unchanged = store
                    .get(&id)
                    .is_ok_and(|s| s.version == version && self.needs_compression(s, s.tier));
                if !unchanged {
                    trace!("[tier] {} changed during recompression, skipping", id);
                    continue;
                }
                if let Some(ratio) = store.modify(&id, |seg| self.apply_outcome(seg, outcome))? {
                    self.record_compression(summary, ratio);
                }
            }
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    fn apply_retention(&self, summary: &mut OptimizationSummary) -> Result<Vec<SegmentId>> {
        let now = self.clock.now_ms();
        let mut store = self.lock();
        let victims: Vec<SegmentId> = match self.limits.retention {
            LongTermRetention::Unlimited => Vec::new(),
            LongTermRetention::MaxAgeSeconds(secs) => {
                let max_age_ms = secs.saturating_mul(1000);
                store
                    .segments_in(Tier::LongTerm)
                    .filter(|s| now.saturating_sub(s.recency) > max_age_ms)
                    .map(|s| s.id.clone())
                    .collect()
            }
            LongTermRetention::MaxCount(max) => {
                let ranked = policy::ranked_for_eviction(
                    store.segments_in(Tier::LongTerm),
                    now,
                    self.limits.recency_decay_secs,
                    &HashSet::new(),
                );
                let excess = ranked.len().saturating_sub(max);
                ranked.into_iter().take(excess).map(|c| c.id).collect()
            }
        };
        for id in &victims {
            if let Some(seg) = store.delete(id)? {
                debug!(
                    "[tier] evict {} from long_term (last access {})",
                    id,
                    format_ms(seg.recency)
                );
            }
            summary.evictions += 1;
        }
        *self
            .last_retention
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(now);
        Ok(victims)
    }

    /// Promote Working segments into free Active space, highest composite
    /// first, without demoting anything.
    async fn fill_active(&self, summary: &mut OptimizationSummary) {
        let order: Vec<SegmentId> = {
            let store = self.lock();
            let mut ranked = policy::ranked_for_eviction(
                store.segments_in(Tier::Working),
                self.clock.now_ms(),
                self.limits.recency_decay_secs,
                &HashSet::new(),
            );
            ranked.reverse();
            ranked.into_iter().map(|c| c.id).collect()
        };

        for id in order {
            {
                let mut store = self.lock();
                let Ok(seg) = store.get(&id) else {
                    continue;
                };
                if seg.tier != Tier::Working {
                    continue;
                }
                let tokens = promoted_tokens(seg, Tier::Active);
                let free = self
                    .limits
                    .active_capacity_tokens
                    .saturating_sub(store.tier_tokens(Tier::Active));
                if tokens > free {
                    continue;
                }
                if let Err(e) = self.apply_promotion(&mut store, &id, Tier::Active, false, summary) {
                    warn!("[tier] could not fill active with {}: {}", id, e);
                    continue;
                }
            }
            tokio::task::yield_now().await;
        }
    }

    // ── Demotion machinery ─────────────────────────────────────────

    /// Run `commit` once `tier` has room for `incoming(store)` more tokens,
    /// demoting segments not in `exclude` into the next colder tier.
    async fn with_room<T>(
        &self,
        tier: Tier,
        exclude: &HashSet<SegmentId>,
        incoming: impl Fn(&SegmentStore) -> Result<usize>,
        commit: impl FnOnce(&mut SegmentStore) -> Result<T>,
        summary: &mut OptimizationSummary,
    ) -> Result<T> {
        let mut conflicts = 0u32;
        let mut made_room = false;
        loop {
            let plan = {
                let mut store = self.lock();
                let need = incoming(&*store)?;
                let Some(capacity) = self.limits.capacity(tier) else {
                    return commit(&mut *store);
                };
                let free = capacity.saturating_sub(store.tier_tokens(tier));
                if need <= free {
                    return commit(&mut *store);
                }
                if made_room {
                    // The space freed last round was taken by someone else.
                    conflicts = self.conflict(tier, conflicts)?;
                }
                self.plan_demotions(&store, tier, need - free, exclude)
                    .ok_or(ContextError::SegmentTooLarge {
                        tokens: need,
                        capacity,
                    })?
            };

            let moves = self.prepare(plan).await?;
            let applied = {
                let mut store = self.lock();
                self.apply_moves(&mut store, moves, summary)?
            };
            if applied {
                made_room = true;
            } else {
                made_room = false;
                conflicts = self.conflict(tier, conflicts)?;
            }
        }
    }

    /// Demote from `tier` until it is within capacity.
    async fn enforce_capacity(&self, tier: Tier, summary: &mut OptimizationSummary) -> Result<()> {
        let Some(capacity) = self.limits.capacity(tier) else {
            return Ok(());
        };
        let mut conflicts = 0u32;
        loop {
            let plan = {
                let store = self.lock();
                let used = store.tier_tokens(tier);
                if used <= capacity {
                    return Ok(());
                }
                match self.plan_demotions(&store, tier, used - capacity, &HashSet::new()) {
                    Some(plan) => plan,
                    None => return Ok(()),
                }
            };
            let moves = self.prepare(plan).await?;
            let applied = {
                let mut store = self.lock();
                self.apply_moves(&mut store, moves, summary)?
            };
            if !applied {
                conflicts = self.conflict(tier, conflicts)?;
            }
            tokio::task::yield_now().await;
        }
    }

    fn conflict(&self, tier: Tier, conflicts: u32) -> Result<u32> {
        let attempts = conflicts + 1;
        if attempts > self.limits.max_conflict_retries {
            warn!("[tier] giving up on {} tier after {} conflicts", tier, attempts);
            return Err(ContextError::ConcurrentModification { tier, attempts });
        }
        debug!("[tier] conflict in {} tier, reselecting (attempt {})", tier, attempts);
        Ok(attempts)
    }

    fn plan_demotions(
        &self,
        store: &SegmentStore,
        from: Tier,
        need: usize,
        exclude: &HashSet<SegmentId>,
    ) -> Option<Vec<Move>> {
        let to = from.colder()?;
        let chosen = policy::select_for_eviction(
            store.segments_in(from),
            self.clock.now_ms(),
            self.limits.recency_decay_secs,
            need,
            exclude,
        )?;
        Some(
            chosen
                .into_iter()
                .map(|candidate| {
                    let job = store
                        .get(&candidate.id)
                        .ok()
                        .filter(|s| self.needs_compression(s, to))
                        .map(|s| (s.content().into_owned(), s.content_type().map(str::to_string)));
                    Move {
                        candidate,
                        to,
                        job,
                        outcome: None,
                    }
                })
                .collect(),
        )
    }

    async fn prepare(&self, mut moves: Vec<Move>) -> Result<Vec<Move>> {
        for m in &mut moves {
            if let Some((content, content_type)) = m.job.take() {
                m.outcome = Some(self.compression.compress_detached(content, content_type).await?);
            }
        }
        Ok(moves)
    }

    /// Apply every move, or none if any candidate changed since selection.
    fn apply_moves(
        &self,
        store: &mut SegmentStore,
        moves: Vec<Move>,
        summary: &mut OptimizationSummary,
    ) -> Result<bool> {
        let valid = moves.iter().all(|m| {
            store.get(&m.candidate.id).is_ok_and(|s| {
                s.tier == m.candidate.tier && s.version == m.candidate.version
            })
        });
        if !valid {
            return Ok(false);
        }

        for m in moves {
            let id = m.candidate.id;
            let to = m.to;
            let outcome = m.outcome;
            let ratio = store.modify(&id, |seg| {
                let ratio = outcome.and_then(|o| self.apply_outcome(seg, o));
                seg.set_tier(to);
                ratio
            })?;
            if let Some(ratio) = ratio {
                self.record_compression(summary, ratio);
            }
            summary.demotions += 1;
            debug!(
                "[tier] demote {} {} -> {}{}",
                id,
                m.candidate.tier,
                to,
                if ratio.is_some() { " (compressed)" } else { "" }
            );
        }
        Ok(true)
    }

    /// Whether `seg` should be compressed to live in `tier`.
    fn needs_compression(&self, seg: &Segment, tier: Tier) -> bool {
        if seg.is_compressed() || seg.incompressible {
            return false;
        }
        match tier {
            Tier::Active => false,
            Tier::Working => seg.token_count > self.limits.inline_threshold_tokens,
            Tier::LongTerm => true,
        }
    }

    /// Install an acceptable outcome, or mark the segment incompressible.
    /// Returns the achieved ratio when the compressed form was installed.
    fn apply_outcome(&self, seg: &mut Segment, outcome: CompressionOutcome) -> Option<f64> {
        if self.compression.is_acceptable(&outcome) {
            let ratio = outcome.achieved_ratio();
            let tokens = seg.token_count;
            seg.set_body(SegmentBody::Compressed(outcome.compressed), tokens);
            Some(ratio)
        } else {
            trace!(
                "[tier] {} incompressible (ratio {:.2}, quality {:.2})",
                seg.id,
                outcome.achieved_ratio(),
                outcome.quality()
            );
            seg.incompressible = true;
            None
        }
    }

    fn record_compression(&self, summary: &mut OptimizationSummary, ratio: f64) {
        summary.compressions += 1;
        self.metrics.record_compression(ratio);
    }
}

/// Tokens `seg` will occupy once moved into `dest`.
fn promoted_tokens(seg: &Segment, dest: Tier) -> usize {
    match (dest, seg.compressed_form()) {
        (Tier::Active, Some(c)) => c.rendered_tokens(),
        _ => seg.resident_tokens(),
    }
}
