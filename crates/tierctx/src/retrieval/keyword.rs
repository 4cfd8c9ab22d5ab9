//! Keyword similarity: the fraction of query terms present in the content.

use crate::text;
use std::collections::{BTreeSet, HashSet};

/// A parsed keyword query.
///
/// Stop words are ignored unless the query consists only of stop words,
/// in which case every word counts.
#[derive(Debug, Clone)]
pub struct KeywordQuery {
    terms: BTreeSet<String>,
    all_words: bool,
}

impl KeywordQuery {
    pub fn parse(query: &str) -> Self {
        let terms: BTreeSet<String> = text::terms(query).into_iter().collect();
        if terms.is_empty() {
            Self {
                terms: text::words(query).into_iter().collect(),
                all_words: true,
            }
        } else {
            Self {
                terms,
                all_words: false,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Overlap fraction in `[0, 1]`.
    pub fn score(&self, content: &str) -> f64 {
        if self.terms.is_empty() {
            return 0.0;
        }
        let present: HashSet<String> = if self.all_words {
            text::words(content).into_iter().collect()
        } else {
            text::terms(content).into_iter().collect()
        };
        let matched = self.terms.iter().filter(|t| present.contains(*t)).count();
        matched as f64 / self.terms.len() as f64
    }
}
