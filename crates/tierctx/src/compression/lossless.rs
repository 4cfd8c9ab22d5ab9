//! Line-level dictionary encoding.
//!
//! Each distinct line is stored once; the document becomes a list of
//! references into that table. Decoding is an exact round trip, including
//! empty lines and a trailing newline.

use std::collections::HashMap;

/// Encoded form: unique lines in first-seen order plus one reference per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LineTable {
    pub lines: Vec<String>,
    pub refs: Vec<u32>,
}

impl LineTable {
    /// Number of line positions that reuse an earlier line.
    pub fn repeated(&self) -> usize {
        self.refs.len() - self.lines.len()
    }
}

pub(crate) fn encode(text: &str) -> LineTable {
    let mut index: HashMap<&str, u32> = HashMap::new();
    let mut lines = Vec::new();
    let mut refs = Vec::new();
    for line in text.split('\n') {
        let next = lines.len() as u32;
        let id = *index.entry(line).or_insert_with(|| {
            lines.push(line.to_string());
            next
        });
        refs.push(id);
    }
    LineTable { lines, refs }
}

/// Rebuild the original text. Returns `None` if a reference is out of range.
pub(crate) fn decode(table: &LineTable) -> Option<String> {
    let mut parts = Vec::with_capacity(table.refs.len());
    for r in &table.refs {
        parts.push(table.lines.get(*r as usize)?.as_str());
    }
    Some(parts.join("\n"))
}

/// Share of line positions that repeat an earlier line.
pub(crate) fn repeated_line_share(text: &str) -> f64 {
    let table = encode(text);
    if table.refs.is_empty() {
        0.0
    } else {
        table.repeated() as f64 / table.refs.len() as f64
    }
}
