//! Splitting oversized content into segments.
//!
//! Without a [`Segmenter`], content above `max_segment_tokens` is cut into
//! fixed word windows that overlap by `chunk_overlap_tokens`
//! ([`fixed_windows`]). A segmenter lets callers cut at semantic
//! boundaries instead; [`ParagraphSegmenter`] is the bundled one.

use crate::text;
use crate::tokenizer::Tokenizer;
use std::fmt;

/// Splits content at semantic boundaries.
pub trait Segmenter: Send + Sync + fmt::Debug {
    /// Split `content` into chunks of at most `max_tokens` where possible.
    fn split(&self, content: &str, max_tokens: usize, tokenizer: &dyn Tokenizer) -> Vec<String>;
}

/// Packs whole paragraphs, then whole sentences, into chunks. A sentence
/// that is too large on its own falls back to word windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParagraphSegmenter;

impl Segmenter for ParagraphSegmenter {
    fn split(&self, content: &str, max_tokens: usize, tokenizer: &dyn Tokenizer) -> Vec<String> {
        // (text, separator placed before it when packed)
        let mut units: Vec<(String, &str)> = Vec::new();
        for para in content.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            if tokenizer.count(para) <= max_tokens {
                units.push((para.to_string(), "\n\n"));
                continue;
            }
            for (i, sentence) in text::sentences(para).into_iter().enumerate() {
                let sep = if i == 0 { "\n\n" } else { " " };
                if tokenizer.count(&sentence) <= max_tokens {
                    units.push((sentence, sep));
                } else {
                    for window in fixed_windows(&sentence, max_tokens, 0, tokenizer) {
                        units.push((window, " "));
                    }
                }
            }
        }

        let mut chunks = Vec::new();
        let mut current = String::new();
        for (unit, sep) in units {
            if current.is_empty() {
                current = unit;
                continue;
            }
            let joined = format!("{current}{sep}{unit}");
            if tokenizer.count(&joined) <= max_tokens {
                current = joined;
            } else {
                chunks.push(std::mem::replace(&mut current, unit));
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

/// Cut `content` into whitespace-word windows of at most `max_tokens`,
/// consecutive windows sharing about `overlap_tokens` tokens. A single word
/// larger than `max_tokens` becomes its own window.
pub fn fixed_windows(
    content: &str,
    max_tokens: usize,
    overlap_tokens: usize,
    tokenizer: &dyn Tokenizer,
) -> Vec<String> {
    let words: Vec<&str> = content.split_whitespace().collect();
    let mut windows = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let len = longest_fitting(&words[start..], max_tokens, tokenizer);
        let end = start + len;
        windows.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        let overlap = if overlap_tokens == 0 {
            0
        } else {
            longest_fitting_suffix(&words[start..end], overlap_tokens, tokenizer)
        };
        start = (end - overlap).max(start + 1);
    }
    windows
}

/// Largest `n ≥ 1` such that the first `n` words fit in `max_tokens`.
fn longest_fitting(words: &[&str], max_tokens: usize, tokenizer: &dyn Tokenizer) -> usize {
    let fits = |n: usize| tokenizer.count(&words[..n].join(" ")) <= max_tokens;
    let (mut lo, mut hi) = (1, words.len());
    if fits(hi) {
        return hi;
    }
    // Invariant: `hi` does not fit; `lo` fits or is the minimum of one word.
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Largest `n < words.len()` such that the last `n` words fit in `max_tokens`.
fn longest_fitting_suffix(words: &[&str], max_tokens: usize, tokenizer: &dyn Tokenizer) -> usize {
    let mut n = 0;
    while n + 1 < words.len()
        && tokenizer.count(&words[words.len() - n - 1..].join(" ")) <= max_tokens
    {
        n += 1;
    }
    n
}
