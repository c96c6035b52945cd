//! Candidate verification: exact string similarity plus anti-noise filters.
//!
//! Band collision only says two windows probably share shingles; this stage
//! re-reads the actual window strings and scores them with a character
//! level similarity in [0, 100]. One task per candidate document pair; each
//! task streams its windows and writes accepted matches in a single flush.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::corpus::Corpus;
use crate::error::PipelineError;
use crate::store::{MatchRow, Store};
use crate::text::TextCache;

/// Character-level similarity metric used by the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Classic sequence-diff ratio: twice the matched length over the sum
    /// of both string lengths.
    #[default]
    Ratio,
    /// Greedy longest-match subtraction: repeatedly excise the longest
    /// common substring above a minimum length and accumulate it.
    GreedyLongestMatch,
}

impl SimilarityMetric {
    /// Score two strings in [0, 100].
    pub fn score(&self, a: &str, b: &str, greedy_min_len: usize) -> f64 {
        match self {
            SimilarityMetric::Ratio => f64::from(TextDiff::from_chars(a, b).ratio()) * 100.0,
            SimilarityMetric::GreedyLongestMatch => greedy_longest_match(a, b, greedy_min_len),
        }
    }
}

/// Keep only alphanumerics and spaces, lowercased, as character vectors.
fn purge(input: &str) -> Vec<char> {
    input
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .flat_map(char::to_lowercase)
        .collect()
}

fn greedy_longest_match(a: &str, b: &str, min_len: usize) -> f64 {
    let mut a = purge(a);
    let mut b = purge(b);
    let avg_len = (a.len() + b.len()) as f64 / 2.0;
    if avg_len == 0.0 {
        return 100.0;
    }
    let mut equal = 0usize;
    loop {
        let (start_a, start_b, len) = longest_common_substring(&a, &b);
        if len < min_len.max(1) {
            break;
        }
        equal += len;
        a.drain(start_a..start_a + len);
        b.drain(start_b..start_b + len);
    }
    (equal as f64 / avg_len) * 100.0
}

/// Longest common substring via a rolling DP row; earliest occurrence wins
/// ties.
fn longest_common_substring(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0usize, 0usize, 0usize);
    if a.is_empty() || b.is_empty() {
        return best;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        for (j, &cb) in b.iter().enumerate() {
            if ca == cb {
                current[j + 1] = prev[j] + 1;
                if current[j + 1] > best.2 {
                    best = (i + 1 - current[j + 1], j + 1 - current[j + 1], current[j + 1]);
                }
            } else {
                current[j + 1] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut current);
    }
    best
}

/// Windows dominated by single-character tokens are punctuation or noise;
/// a match where either side crosses the threshold is rejected.
pub fn is_noisy(window_text: &str, window_length: usize) -> bool {
    let singles = window_text
        .split_whitespace()
        .filter(|w| w.chars().count() == 1)
        .count();
    singles as f64 >= window_length as f64 * 0.75
}

/// Verify every candidate pair and populate the Match relation.
pub fn verify_matches(
    corpus: &Corpus,
    cfg: &RunConfig,
    texts: &TextCache,
    store: &dyn Store,
) -> Result<(), PipelineError> {
    let pairs = store.candidate_pairs()?;
    info!(pairs = pairs.len(), "validating matches");
    pairs
        .par_iter()
        .map(|&(doc_a, doc_b)| verify_pair(doc_a, doc_b, corpus, cfg, texts, store))
        .collect::<Result<Vec<()>, PipelineError>>()?;
    Ok(())
}

fn verify_pair(
    doc_a: u32,
    doc_b: u32,
    corpus: &Corpus,
    cfg: &RunConfig,
    texts: &TextCache,
    store: &dyn Store,
) -> Result<(), PipelineError> {
    let windows_a = match texts.windows(corpus.path(doc_a)) {
        Ok(w) => w,
        Err(err) => {
            warn!(doc_a, error = %err, "skipping pair; document unreadable");
            return Ok(());
        }
    };
    let windows_b = match texts.windows(corpus.path(doc_b)) {
        Ok(w) => w,
        Err(err) => {
            warn!(doc_b, error = %err, "skipping pair; document unreadable");
            return Ok(());
        }
    };

    let mut rows = Vec::new();
    for (window_a, window_b) in store.candidate_windows(doc_a, doc_b)? {
        let (Some(text_a), Some(text_b)) = (
            windows_a.get(window_a as usize),
            windows_b.get(window_b as usize),
        ) else {
            // Usually a stale signature cache mixed with edited inputs.
            warn!(
                doc_a,
                window_a,
                available_a = windows_a.len(),
                doc_b,
                window_b,
                available_b = windows_b.len(),
                "window lookup out of bounds"
            );
            continue;
        };

        let sim = cfg.metric.score(text_a, text_b, cfg.greedy_min_len);
        if sim >= f64::from(cfg.min_sim) {
            if is_noisy(text_a, cfg.window_length) || is_noisy(text_b, cfg.window_length) {
                continue;
            }
            rows.push(MatchRow {
                doc_a,
                doc_b,
                window_a,
                window_b,
                similarity: sim.min(100.0).floor() as u32,
            });
        }
    }
    store.write_matches(&rows)?;
    Ok(())
}
