//! Draft reconciliation.
//! Rebuilds a full improved document from the fixer's old/optimized pairs
//! and aligns it sentence-by-sentence against the original. Ambiguity is
//! resolved conservatively: a pair that cannot be placed with confidence
//! is skipped rather than guessed.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One rewrite proposed by the fixer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DraftPair {
    pub original: String,
    pub improved: String,
}

/// Kind of one row in the rendered comparison.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Unchanged,
    Changed,
    Added,
    Removed,
}

/// Atomic row of the original-vs-improved comparison.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffUnit {
    pub kind: DiffKind,
    pub original: String,
    pub improved: String,
}

static PAIR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<old_draft>\s*(.*?)\s*</old_draft>\s*<optimized_draft>\s*(.*?)\s*</optimized_draft>")
        .expect("static draft pair regex")
});

// Up to this many leading words anchor the fuzzy replacement pattern.
const KEY_PHRASE_WORDS: usize = 5;

/// Extracts old/optimized pairs positionally from the fixer response.
/// Pairs with an empty side after trimming are discarded.
pub fn parse_pairs(response: &str) -> Vec<DraftPair> {
    PAIR_RE
        .captures_iter(response)
        .filter_map(|caps| {
            let original = caps.get(1)?.as_str().trim();
            let improved = caps.get(2)?.as_str().trim();
            (!original.is_empty() && !improved.is_empty()).then(|| DraftPair {
                original: original.to_string(),
                improved: improved.to_string(),
            })
        })
        .collect()
}

/// Like `parse_pairs`, but an empty result is surfaced as its own error
/// so callers can tell "nothing extractable" apart from a transport
/// failure; the former usually means the content is already acceptable.
pub fn parse_pairs_strict(response: &str) -> Result<Vec<DraftPair>, crate::PipelineError> {
    let pairs = parse_pairs(response);
    if pairs.is_empty() {
        return Err(crate::PipelineError::NoPairs);
    }
    Ok(pairs)
}

/// Rebuilds the full improved document by substituting each pair into a
/// working copy of the original. Pairs apply longest-original-first so a
/// short span's replacement cannot clobber part of a longer overlapping
/// one. A pair whose original is not a literal substring falls back to a
/// key-phrase pattern (its first words up to the next sentence
/// terminator); the fallback fires only on exactly one match.
pub fn reconstruct(original: &str, pairs: &[DraftPair]) -> String {
    let mut working = original.to_string();
    let mut ordered: Vec<&DraftPair> = pairs.iter().collect();
    ordered.sort_by(|a, b| b.original.len().cmp(&a.original.len()));

    for pair in ordered {
        if let Some(index) = working.find(&pair.original) {
            working.replace_range(index..index + pair.original.len(), &pair.improved);
            continue;
        }
        let Some(regex) = key_phrase_pattern(&pair.original) else {
            continue;
        };
        let (first, second) = {
            let mut matches = regex.find_iter(&working);
            (
                matches.next().map(|m| m.range()),
                matches.next().map(|m| m.range()),
            )
        };
        match (first, second) {
            (Some(range), None) => {
                working.replace_range(range, &pair.improved);
            }
            _ => {
                tracing::debug!(
                    original = %pair.original,
                    "fuzzy replacement skipped: zero or multiple key-phrase matches"
                );
            }
        }
    }
    working
}

fn key_phrase_pattern(original: &str) -> Option<Regex> {
    let words: Vec<&str> = original.split_whitespace().take(KEY_PHRASE_WORDS).collect();
    if words.is_empty() {
        return None;
    }
    let mut source = String::new();
    for (index, word) in words.iter().enumerate() {
        if index > 0 {
            source.push_str(r"\s+");
        }
        source.push_str(&regex::escape(word));
    }
    source.push_str(r"[^.!?]*[.!?]?");
    Regex::new(&source).ok()
}

/// A document whose flagged spans are wrapped in identifiable markers, the
/// alternate reconciliation target when the host carries markup instead of
/// plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkedDocument {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Plain(String),
    Marked {
        /// Marker identity, preserved across content swaps so hover sync
        /// keeps working downstream.
        id: String,
        /// The span text recorded when the marker was created.
        original: String,
        content: String,
    },
}

impl MarkedDocument {
    pub fn new(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Swaps the content of every marker whose recorded original text
    /// equals a pair's original exactly. Marker ids are untouched.
    /// Returns the number of swaps performed.
    pub fn apply(&mut self, pairs: &[DraftPair]) -> usize {
        let mut swapped = 0;
        for part in &mut self.parts {
            let Part::Marked {
                original, content, ..
            } = part
            else {
                continue;
            };
            if let Some(pair) = pairs.iter().find(|p| p.original == *original) {
                *content = pair.improved.clone();
                swapped += 1;
            }
        }
        swapped
    }

    pub fn plain_text(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                Part::Plain(text) => text.as_str(),
                Part::Marked { content, .. } => content.as_str(),
            })
            .collect()
    }
}

/// Sentence-like units with their terminal punctuation retained as suffix.
pub fn sentence_units(text: &str) -> Vec<String> {
    let mut units = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\n' {
            flush_unit(&mut current, &mut units);
            continue;
        }
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let boundary = match chars.peek() {
                Some(next) => next.is_whitespace(),
                None => true,
            };
            if boundary {
                flush_unit(&mut current, &mut units);
            }
        }
    }
    flush_unit(&mut current, &mut units);
    units
}

fn flush_unit(current: &mut String, units: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        units.push(trimmed.to_string());
    }
    current.clear();
}

/// Greedy single-pass alignment of the two unit sequences. Lookahead on
/// either side resynchronizes on the next exact match; a paired mismatch
/// with no resync point on either side becomes one `Changed` row. Linear
/// time, no backtracking; not a minimal edit script.
pub fn align_units(original: &str, improved: &str) -> Vec<DiffUnit> {
    let a = sentence_units(original);
    let b = sentence_units(improved);
    let mut out = Vec::new();
    let mut i = 0;
    let mut j = 0;

    while i < a.len() || j < b.len() {
        if i < a.len() && j < b.len() {
            if a[i] == b[j] {
                out.push(DiffUnit {
                    kind: DiffKind::Unchanged,
                    original: a[i].clone(),
                    improved: b[j].clone(),
                });
                i += 1;
                j += 1;
                continue;
            }
            if let Some(k) = (j + 1..b.len()).find(|&k| b[k] == a[i]) {
                for unit in &b[j..k] {
                    out.push(DiffUnit {
                        kind: DiffKind::Added,
                        original: String::new(),
                        improved: unit.clone(),
                    });
                }
                out.push(DiffUnit {
                    kind: DiffKind::Unchanged,
                    original: a[i].clone(),
                    improved: b[k].clone(),
                });
                i += 1;
                j = k + 1;
                continue;
            }
            if let Some(k) = (i + 1..a.len()).find(|&k| a[k] == b[j]) {
                for unit in &a[i..k] {
                    out.push(DiffUnit {
                        kind: DiffKind::Removed,
                        original: unit.clone(),
                        improved: String::new(),
                    });
                }
                out.push(DiffUnit {
                    kind: DiffKind::Unchanged,
                    original: a[k].clone(),
                    improved: b[j].clone(),
                });
                i = k + 1;
                j += 1;
                continue;
            }
            out.push(DiffUnit {
                kind: DiffKind::Changed,
                original: a[i].clone(),
                improved: b[j].clone(),
            });
            i += 1;
            j += 1;
            continue;
        }
        if i < a.len() {
            out.push(DiffUnit {
                kind: DiffKind::Removed,
                original: a[i].clone(),
                improved: String::new(),
            });
            i += 1;
            continue;
        }
        out.push(DiffUnit {
            kind: DiffKind::Added,
            original: String::new(),
            improved: b[j].clone(),
        });
        j += 1;
    }
    out
}
