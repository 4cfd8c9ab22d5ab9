//! Structural invariants under generated operation sequences.

use proptest::prelude::*;
use proptest::sample::Index;
use std::sync::Arc;
use tierctx::compression::CompressionEngine;
use tierctx::prelude::*;

const VOCAB: &[&str] = &[
    "deploy", "rollback", "latency", "cache", "shard", "replica", "quorum", "lease", "index",
    "migration", "schema", "backup", "restore", "alert", "pager", "budget", "token", "prompt",
];

/// One public call against the manager.
#[derive(Debug, Clone)]
enum Op {
    Add(Vec<usize>),
    Retrieve(usize, usize),
    Remove(Index),
    Optimize,
    Advance(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        5 => prop::collection::vec(0..VOCAB.len(), 3..43).prop_map(Op::Add),
        2 => (0..VOCAB.len(), 0..VOCAB.len()).prop_map(|(a, b)| Op::Retrieve(a, b)),
        1 => any::<Index>().prop_map(Op::Remove),
        1 => Just(Op::Optimize),
        1 => (1u64..600).prop_map(Op::Advance),
    ]
}

/// Adds, retrievals and clock moves only; nothing that rebalances.
fn settling_op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => prop::collection::vec(0..VOCAB.len(), 5..25).prop_map(Op::Add),
        1 => (0..VOCAB.len(), 0..VOCAB.len()).prop_map(|(a, b)| Op::Retrieve(a, b)),
        1 => (0u64..120).prop_map(Op::Advance),
    ]
}

fn sentence(words: &[usize]) -> String {
    words.iter().map(|&i| VOCAB[i]).collect::<Vec<_>>().join(" ")
}

fn config() -> ContextConfig {
    ContextConfig::default()
        .with_active_capacity(60)
        .with_working_multiplier(2.0)
        .with_retention(LongTermRetention::MaxCount(6))
        .with_inline_threshold(8)
        .with_max_segment_tokens(25)
        .with_chunk_overlap(3)
        .with_similarity_threshold(0.2)
}

fn manager(clock: &ManualClock) -> ContextManager {
    ContextManager::builder(config())
        .with_tokenizer(Arc::new(WhitespaceTokenizer))
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn all_ids(m: &ContextManager) -> Vec<SegmentId> {
    Tier::ALL.iter().flat_map(|t| m.ids_in(*t)).collect()
}

fn placement(m: &ContextManager) -> Vec<(SegmentId, Tier)> {
    all_ids(m)
        .into_iter()
        .map(|id| {
            let tier = m.get(&id).unwrap().tier;
            (id, tier)
        })
        .collect()
}

async fn apply(m: &ContextManager, clock: &ManualClock, op: &Op) {
    match op {
        Op::Add(words) => {
            m.add_context(&sentence(words), Metadata::new()).await.unwrap();
        }
        Op::Retrieve(a, b) => {
            m.retrieve_relevant(&sentence(&[*a, *b]), 4).await.unwrap();
        }
        Op::Remove(index) => {
            let ids = all_ids(m);
            if !ids.is_empty() {
                m.remove_context(index.get(ids.as_slice())).unwrap();
            }
        }
        Op::Optimize => {
            m.optimize().await.unwrap();
        }
        Op::Advance(secs) => {
            clock.advance_secs(*secs);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn random_operations_preserve_invariants(ops in prop::collection::vec(op_strategy(), 1..120)) {
        runtime().block_on(async {
            let clock = ManualClock::at_ms(10_000_000);
            let m = manager(&clock);

            for (step, op) in ops.iter().enumerate() {
                apply(&m, &clock, op).await;

                let verified = m.verify_invariants();
                prop_assert!(verified.is_ok(), "step {} ({:?}): {:?}", step, op, verified);
                let ids = all_ids(&m);
                prop_assert_eq!(ids.len(), m.len(), "segment listed in more than one tier");
                for id in &ids {
                    let seg = m.get(id).unwrap();
                    prop_assert!(
                        seg.tier != Tier::Active || !seg.is_compressed(),
                        "{} is compressed in Active",
                        id
                    );
                }
            }
            Ok(())
        })?;
    }

    #[test]
    fn optimize_twice_is_a_no_op(ops in prop::collection::vec(settling_op_strategy(), 1..40)) {
        runtime().block_on(async {
            let clock = ManualClock::at_ms(10_000_000);
            let m = manager(&clock);
            for op in &ops {
                apply(&m, &clock, op).await;
            }

            m.optimize().await.unwrap();
            let before = placement(&m);
            let second = m.optimize().await.unwrap();
            prop_assert!(second.is_empty(), "second optimize made transitions: {:?}", second);
            prop_assert_eq!(before, placement(&m));
            Ok(())
        })?;
    }

    #[test]
    fn lossless_compression_round_trips(content in any::<String>()) {
        let engine = CompressionEngine::new(
            CompressionStrategy::Lossless,
            0.3,
            0.8,
            Arc::new(CharRatioTokenizer::default()),
        );
        let outcome = engine.compress_with(CompressionStrategy::Lossless, &content, 0.3);
        prop_assert_eq!(outcome.quality(), 1.0);
        prop_assert_eq!(engine.decompress(&outcome.compressed).unwrap(), content);
    }

    #[test]
    fn lossless_round_trips_line_heavy_text(
        lines in prop::collection::vec("[a-z ]{0,12}\r?", 0..40)
    ) {
        let content = lines.join("\n");
        let engine = CompressionEngine::new(
            CompressionStrategy::Lossless,
            0.3,
            0.8,
            Arc::new(WhitespaceTokenizer),
        );
        let outcome = engine.compress_with(CompressionStrategy::Lossless, &content, 0.3);
        prop_assert_eq!(engine.decompress(&outcome.compressed).unwrap(), content);
    }
}

#[tokio::test]
async fn retention_by_age_drops_idle_long_term_segments() {
    let clock = ManualClock::at_ms(10_000_000);
    let m = ContextManager::builder(
        ContextConfig::default().with_retention(LongTermRetention::MaxAgeSeconds(60)),
    )
    .with_tokenizer(Arc::new(WhitespaceTokenizer))
    .with_clock(Arc::new(clock.clone()))
    .build()
    .unwrap();

    let old = m
        .add_context_to("stale archived note", Metadata::new(), Tier::LongTerm)
        .await
        .unwrap()
        .remove(0);
    clock.advance_secs(120);
    let fresh = m
        .add_context_to("fresh archived note", Metadata::new(), Tier::LongTerm)
        .await
        .unwrap()
        .remove(0);

    let summary = m.optimize().await.unwrap();
    assert_eq!(summary.evictions, 1);
    assert!(matches!(m.get(&old), Err(ContextError::NotFound(_))));
    assert!(m.get(&fresh).is_ok());
}
