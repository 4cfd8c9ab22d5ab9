//! Lossy strategies: extractive summarization and head/tail truncation.

use crate::text;
use crate::tokenizer::Tokenizer;
use std::collections::HashMap;

/// Marker inserted between the kept head and tail.
pub const TRUNCATION_MARKER: &str = "...[truncated]...";

/// Bonus for the opening sentence, which usually states the topic.
const LEAD_BONUS: f64 = 0.1;

/// Share of the head/tail budget spent on the head.
const HEAD_SHARE: f64 = 0.7;

/// Keep the highest-scoring sentences, in document order, within
/// `budget_tokens`. At least one sentence is always kept.
pub(crate) fn summarize(content: &str, budget_tokens: usize, tokenizer: &dyn Tokenizer) -> String {
    let sentences = text::sentences(content);
    if sentences.len() <= 1 {
        return sentences.into_iter().next().unwrap_or_default();
    }

    let tf = text::term_frequencies(content);
    let max_tf = tf.values().copied().fold(0.0f64, f64::max).max(1.0);

    let mut scored: Vec<(usize, f64, usize)> = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let score = sentence_score(s, &tf, max_tf) + if i == 0 { LEAD_BONUS } else { 0.0 };
            (i, score, tokenizer.count(s))
        })
        .collect();
    // Highest score first; earlier sentence wins ties.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut keep: Vec<usize> = Vec::new();
    let mut used = 0;
    for (i, _, tokens) in &scored {
        if keep.is_empty() || used + tokens <= budget_tokens {
            keep.push(*i);
            used += tokens;
        }
    }
    keep.sort_unstable();

    keep.iter()
        .map(|i| sentences[*i].as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn sentence_score(sentence: &str, tf: &HashMap<String, f64>, max_tf: f64) -> f64 {
    let terms = text::terms(sentence);
    if terms.is_empty() {
        return 0.0;
    }
    let total: f64 = terms
        .iter()
        .map(|t| tf.get(t).copied().unwrap_or(0.0) / max_tf)
        .sum();
    total / terms.len() as f64
}

/// Keep the first 70% and last 30% of `target_ratio × chars`, joined by
/// [`TRUNCATION_MARKER`]. Content already within budget is returned as is.
pub(crate) fn head_tail(content: &str, target_ratio: f64) -> String {
    let total = content.chars().count();
    let target = (total as f64 * target_ratio) as usize;
    if target >= total {
        return content.to_string();
    }
    let keep_start = (target as f64 * HEAD_SHARE) as usize;
    let keep_end = target - keep_start;

    let head: String = content.chars().take(keep_start).collect();
    if keep_end == 0 {
        return format!("{head}...[truncated]");
    }
    let tail: String = content.chars().skip(total - keep_end).collect();
    format!("{head}{TRUNCATION_MARKER}{tail}")
}
