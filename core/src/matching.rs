//! Fuzzy text-to-unit matching.
//! The generator is asked to echo input verbatim when tagging, but drifts
//! on whitespace and punctuation in practice, so a strict substring check
//! fails too often. Spans are instead scored by significant-word overlap
//! against sentence/paragraph-sized units of the live text, and only a
//! majority score is accepted.

use std::collections::HashSet;
use std::ops::Range;

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::MatchRules;

/// Best-matching live unit for a tagged span, with its confidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitMatch {
    pub text: String,
    pub score: f32,
}

// Terminal punctuation followed by whitespace, or hard line breaks.
static UNIT_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+|\n+").expect("static unit split regex"));

// Punctuation stripped before word comparison.
const STRIPPED: &str = ".,/#!$%^&*;:{}=-_`~()'\"[]";

/// Sentence/paragraph-sized candidate units of the live text.
pub fn candidate_units(text: &str) -> Vec<&str> {
    UNIT_SPLIT_RE
        .split(text)
        .map(str::trim)
        .filter(|unit| !unit.is_empty())
        .collect()
}

/// Lowercased words with punctuation stripped; empty tokens dropped.
pub fn normalize_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|token| {
            let word: String = token
                .chars()
                .filter(|c| !STRIPPED.contains(*c))
                .flat_map(char::to_lowercase)
                .collect();
            (!word.is_empty()).then_some(word)
        })
        .collect()
}

/// Locates the candidate unit with the highest significant-word overlap.
/// Targets with too few significant words are refused as ambiguous, and a
/// winner must score strictly above the acceptance threshold. The first
/// candidate to reach the maximum wins (stable left-to-right scan).
pub fn best_unit(live_text: &str, target: &str, rules: &MatchRules) -> Option<UnitMatch> {
    let target_words = normalize_words(target);
    let significant: Vec<&String> = target_words
        .iter()
        .filter(|word| word.chars().count() > rules.significant_word_len)
        .collect();
    if significant.len() < rules.min_significant_words {
        return None;
    }

    let mut best: Option<UnitMatch> = None;
    for unit in candidate_units(live_text) {
        let unit_words: HashSet<String> = normalize_words(unit).into_iter().collect();
        let matched = significant
            .iter()
            .filter(|word| unit_words.contains(word.as_str()))
            .count();
        let score = matched as f32 / significant.len() as f32;
        if score > rules.accept_threshold && best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(UnitMatch {
                text: unit.to_string(),
                score,
            });
        }
    }
    best
}

/// Every literal occurrence of `needle` in one text node, as byte ranges.
/// Overlapping occurrences of a periodic needle are all reported; by this
/// point the needle is known to exist verbatim in the node it was taken
/// from, so the scan is exact.
pub fn find_occurrences(haystack: &str, needle: &str) -> Vec<Range<usize>> {
    if needle.is_empty() {
        return Vec::new();
    }
    let automaton = AhoCorasick::new([needle]);
    automaton
        .find_overlapping_iter(haystack)
        .map(|m| m.start()..m.end())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> MatchRules {
        MatchRules::default()
    }

    #[test]
    fn splits_units_on_terminators_and_breaks() {
        let units = candidate_units("First one. Second one!\nThird one");
        assert_eq!(units, vec!["First one", "Second one", "Third one"]);
    }

    #[test]
    fn normalizes_words_like_the_generator_sees_them() {
        assert_eq!(
            normalize_words("Our product is a game-changer."),
            vec!["our", "product", "is", "a", "gamechanger"]
        );
    }

    #[test]
    fn matches_originating_sentence_with_full_overlap() {
        let live = "Our product is a game-changer. It solves problems. \
                    The API uses REST and returns JSON payloads synchronously.";
        let m = best_unit(live, "Our product is a game-changer.", &rules()).unwrap();
        assert_eq!(m.text, "Our product is a game-changer");
        assert!((m.score - 1.0).abs() < f32::EPSILON);

        let m = best_unit(
            live,
            "The API uses REST and returns JSON payloads synchronously.",
            &rules(),
        )
        .unwrap();
        assert_eq!(
            m.text,
            "The API uses REST and returns JSON payloads synchronously."
        );
        assert!((m.score - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn refuses_targets_with_too_few_significant_words() {
        let live = "Act now to win big. The rest of the draft is fine.";
        assert!(best_unit(live, "Act now", &rules()).is_none());
        assert!(best_unit(live, "now to it of", &rules()).is_none());
    }

    #[test]
    fn never_accepts_majority_or_below() {
        // Two of four significant words present: score 0.5, not > 0.5.
        let live = "alpha bravo filler filler.";
        assert!(best_unit(live, "alpha bravo charlie delta", &rules()).is_none());
    }

    #[test]
    fn tolerates_generator_formatting_drift() {
        let live = "Unlock the secret to instant results today.";
        let target = "unlock the secret, to instant results today";
        let m = best_unit(live, target, &rules()).unwrap();
        assert!(m.score > 0.5);
        assert_eq!(m.text, "Unlock the secret to instant results today.");
    }

    #[test]
    fn first_maximum_wins_on_ties() {
        let live = "alpha bravo charlie delta. alpha bravo charlie delta.";
        let m = best_unit(live, "alpha bravo charlie delta", &rules()).unwrap();
        // Both candidates score 1.0; the earlier one is kept.
        assert_eq!(m.text, "alpha bravo charlie delta");
    }

    #[test]
    fn matching_is_idempotent() {
        let live = "The quick brown fox jumps over the lazy dog. Something else entirely.";
        let target = "quick brown fox jumps";
        let first = best_unit(live, target, &rules());
        let second = best_unit(live, target, &rules());
        assert_eq!(first, second);
    }

    #[test]
    fn finds_every_literal_occurrence() {
        let ranges = find_occurrences("spam and spam and spam", "spam");
        assert_eq!(ranges, vec![0..4, 9..13, 18..22]);
    }

    #[test]
    fn finds_overlapping_occurrences_of_periodic_needles() {
        let ranges = find_occurrences("aaaa", "aaa");
        assert_eq!(ranges, vec![0..3, 1..4]);
    }

    #[test]
    fn empty_needle_matches_nothing() {
        assert!(find_occurrences("anything", "").is_empty());
    }
}
