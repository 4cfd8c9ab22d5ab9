//! Lexical helpers shared by compression quality estimates and keyword
//! retrieval.

use std::collections::HashMap;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "that", "the", "this", "to", "was", "with",
];

/// Lowercased alphanumeric words.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Lowercased alphanumeric terms, stop words removed.
pub fn terms(text: &str) -> Vec<String> {
    words(text)
        .into_iter()
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Term counts for `text`.
pub fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut tf = HashMap::new();
    for term in terms(text) {
        *tf.entry(term).or_insert(0.0) += 1.0;
    }
    tf
}

/// Cosine similarity of two sparse term vectors, in `[0, 1]`.
pub fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .filter_map(|(k, va)| b.get(k).map(|vb| va * vb))
        .sum();
    let norm_a = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
    }
}

/// Cosine similarity of two dense vectors, clamped to `[0, 1]`.
pub fn dense_cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += f64::from(*x) * f64::from(*y);
        na += f64::from(*x) * f64::from(*x);
        nb += f64::from(*y) * f64::from(*y);
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        (dot / (na.sqrt() * nb.sqrt())).clamp(0.0, 1.0)
    }
}

/// Split text into sentences at `.`, `!`, `?` followed by whitespace, and at
/// line breaks. Sentences are trimmed; empty ones are dropped.
pub fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\n' {
            push_trimmed(&mut out, &mut current);
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_none_or(|n| n.is_whitespace()) {
            push_trimmed(&mut out, &mut current);
        }
    }
    push_trimmed(&mut out, &mut current);
    out
}

fn push_trimmed(out: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_drop_stop_words_and_punctuation() {
        assert_eq!(
            terms("The cat, and the HAT!"),
            vec!["cat".to_string(), "hat".to_string()]
        );
    }

    #[test]
    fn cosine_identical_is_one() {
        let a = term_frequencies("rust memory tiers");
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-9);
        let b = term_frequencies("python garbage collector");
        assert_eq!(cosine(&a, &b), 0.0);
    }

    #[test]
    fn dense_cosine_mismatched_lengths() {
        assert_eq!(dense_cosine(&[1.0, 0.0], &[1.0]), 0.0);
        assert!((dense_cosine(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn sentence_splitting() {
        let s = sentences("First one. Second one! Version 1.5 is out\nThird line?");
        assert_eq!(
            s,
            vec![
                "First one.".to_string(),
                "Second one!".to_string(),
                "Version 1.5 is out".to_string(),
                "Third line?".to_string(),
            ]
        );
    }
}
