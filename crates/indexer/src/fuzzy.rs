//! Fuzzy retrieval over the scene store
//!
//! Scores each caption against the query with a partial-ratio metric: the
//! best alignment of the shorter string within the longer one, so a short
//! query still scores 100 against a long caption that contains it. Matching
//! is case-insensitive and results keep store (sorted-key) order rather than
//! score order.

use std::collections::BTreeSet;
use std::path::Path;
use strsim::normalized_levenshtein;
use tracing::{debug, warn};

use crate::SceneStore;

/// Default acceptance threshold on the 0-100 partial-ratio scale
pub const DEFAULT_THRESHOLD: f64 = 70.0;

/// Partial-match similarity between two strings on a 0-100 scale
///
/// The shorter string is slid over every same-length character window of the
/// longer one; the best window's normalized Levenshtein similarity is the
/// score. An exact substring therefore scores 100.
#[must_use]
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() || b_chars.is_empty() {
        return 0.0;
    }

    let (shorter, longer) = if a_chars.len() <= b_chars.len() {
        (&a_chars, &b_chars)
    } else {
        (&b_chars, &a_chars)
    };

    let needle: String = shorter.iter().collect();
    let mut best = 0.0f64;
    for window in longer.windows(shorter.len()) {
        let candidate: String = window.iter().collect();
        let score = normalized_levenshtein(&needle, &candidate);
        if score > best {
            best = score;
            if best >= 1.0 {
                break;
            }
        }
    }

    best * 100.0
}

/// Find scene paths whose captions fuzzily match `query_word`
///
/// Returns paths in store order. A missing or malformed store is reported and
/// yields zero matches; it never propagates as an error.
#[must_use]
pub fn find_matches(query_word: &str, store_path: &Path, threshold: f64) -> Vec<String> {
    let store = match SceneStore::load(store_path) {
        Ok(store) => store,
        Err(e) => {
            warn!("Cannot read scene store: {}", e);
            return Vec::new();
        }
    };

    let query = query_word.to_lowercase();
    let mut matched = Vec::new();
    for (scene_path, caption) in store.iter() {
        let similarity = partial_ratio(&query, &caption.to_lowercase());
        if similarity >= threshold {
            debug!(
                "Matched {} (score {:.0}): {}",
                scene_path, similarity, caption
            );
            matched.push(scene_path.clone());
        }
    }

    matched
}

/// Build the autocomplete vocabulary from every caption in the store
///
/// Captions are lowercased, whitespace-tokenized, and each token stripped of
/// surrounding punctuation; the result is deduplicated and sorted. The
/// vocabulary is a search aid only and never affects scoring.
#[must_use]
pub fn caption_vocabulary(store_path: &Path) -> Vec<String> {
    let store = match SceneStore::load(store_path) {
        Ok(store) => store,
        Err(e) => {
            warn!("Cannot read scene store: {}", e);
            return Vec::new();
        }
    };

    let mut words = BTreeSet::new();
    for (_, caption) in store.iter() {
        for token in caption.to_lowercase().split_whitespace() {
            let cleaned = token.trim_matches(|c: char| c.is_ascii_punctuation());
            if !cleaned.is_empty() {
                words.insert(cleaned.to_string());
            }
        }
    }

    words.into_iter().collect()
}
