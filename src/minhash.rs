//! MinHash fingerprinting over character shingles.
//!
//! Each window is reduced to the set of its lowercased character
//! `chargram_length`-grams, and the signature is the per-permutation minimum
//! of K independent linear permutations of one seeded base hash. The
//! permutation parameters are derived deterministically from the seed, so
//! identical `(text, K, C, seed)` inputs produce byte-identical signatures
//! on every platform.

use std::collections::HashSet;

use rayon::prelude::*;
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::config::RunConfig;

/// Produces window signatures.
///
/// The default implementation is [`MinHasher`]; an accelerated
/// implementation (e.g. a batch GPU hasher) may replace it as long as its
/// output is bit-identical.
pub trait Fingerprinter: Send + Sync {
    /// Signature of a single window.
    fn signature(&self, window_text: &str) -> Vec<u32>;

    /// Number of permutations (signature length).
    fn num_permutations(&self) -> usize;

    /// Signatures for every window of a document. Batch entry point so
    /// implementations can vectorize across windows.
    fn signatures(&self, windows: &[String]) -> Vec<Vec<u32>> {
        windows.par_iter().map(|w| self.signature(w)).collect()
    }
}

/// Default CPU MinHash implementation.
pub struct MinHasher {
    chargram_length: usize,
    seed: u64,
    /// `(multiplier, offset)` per permutation; multipliers are forced odd so
    /// each permutation is a bijection on u64.
    perms: Vec<(u64, u64)>,
}

impl MinHasher {
    pub fn new(num_permutations: usize, chargram_length: usize, seed: u64) -> Self {
        let mut perms = Vec::with_capacity(num_permutations);
        let mut state = seed;
        for _ in 0..num_permutations {
            state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
            let a = splitmix64(state) | 1;
            state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
            let b = splitmix64(state);
            perms.push((a, b));
        }
        Self {
            chargram_length,
            seed,
            perms,
        }
    }

    pub fn from_config(cfg: &RunConfig) -> Self {
        Self::new(cfg.num_permutations, cfg.chargram_length, cfg.seed)
    }

    /// Hash the unique character grams of a lowercased window.
    fn gram_hashes(&self, text: &str) -> Vec<u64> {
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();
        if self.chargram_length == 0 || chars.len() < self.chargram_length {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        let mut gram = String::with_capacity(self.chargram_length * 4);
        for start in 0..=chars.len() - self.chargram_length {
            gram.clear();
            gram.extend(&chars[start..start + self.chargram_length]);
            seen.insert(xxh3_64_with_seed(gram.as_bytes(), self.seed));
        }
        seen.into_iter().collect()
    }
}

impl Fingerprinter for MinHasher {
    fn signature(&self, window_text: &str) -> Vec<u32> {
        let grams = self.gram_hashes(window_text);
        if grams.is_empty() {
            return vec![u32::MAX; self.perms.len()];
        }
        self.perms
            .iter()
            .map(|&(a, b)| {
                let mut minv = u32::MAX;
                for &g in &grams {
                    let h = (a.wrapping_mul(g).wrapping_add(b) >> 32) as u32;
                    if h < minv {
                        minv = h;
                    }
                }
                minv
            })
            .collect()
    }

    fn num_permutations(&self) -> usize {
        self.perms.len()
    }
}

#[inline]
pub(crate) fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher(k: usize) -> MinHasher {
        MinHasher::new(k, 4, 42)
    }

    #[test]
    fn signature_has_requested_length() {
        let h = hasher(16);
        assert_eq!(h.signature("the quick brown fox").len(), 16);
        assert_eq!(h.num_permutations(), 16);
    }

    #[test]
    fn signature_deterministic() {
        let h = hasher(32);
        let a = h.signature("some window of words here");
        let b = h.signature("some window of words here");
        assert_eq!(a, b);
    }

    #[test]
    fn signature_case_insensitive() {
        let h = hasher(32);
        assert_eq!(
            h.signature("The Quick Brown Fox"),
            h.signature("the quick brown fox")
        );
    }

    #[test]
    fn different_seeds_produce_different_signatures() {
        let a = MinHasher::new(32, 4, 1).signature("shared window text");
        let b = MinHasher::new(32, 4, 2).signature("shared window text");
        assert_ne!(a, b);
    }

    #[test]
    fn short_text_yields_sentinel_signature() {
        let h = hasher(8);
        assert_eq!(h.signature("abc"), vec![u32::MAX; 8]);
        assert_eq!(h.signature(""), vec![u32::MAX; 8]);
    }

    #[test]
    fn similar_windows_share_slots() {
        let h = hasher(128);
        let a = h.signature("the quick brown fox jumps over the lazy dog");
        let b = h.signature("the quick brown fox jumps over the lazy cat");
        let matching = a.iter().zip(&b).filter(|(x, y)| x == y).count();
        assert!(matching > 64, "expected mostly shared slots, got {matching}");
    }

    #[test]
    fn disjoint_windows_share_few_slots() {
        let h = hasher(128);
        let a = h.signature("entirely different passage about rivers and stones");
        let b = h.signature("zebras quantify xylophones with jittery vigor");
        let matching = a.iter().zip(&b).filter(|(x, y)| x == y).count();
        assert!(matching < 32, "expected few shared slots, got {matching}");
    }

    #[test]
    fn multibyte_text_shingles_by_character() {
        // Four characters is exactly one gram regardless of byte width.
        let h = MinHasher::new(8, 4, 7);
        assert_ne!(h.signature("\u{00E9}t\u{00E9}s"), vec![u32::MAX; 8]);
    }

    #[test]
    fn batch_signatures_match_single_calls() {
        let h = hasher(16);
        let windows = vec![
            "first window of text".to_string(),
            "second window of text".to_string(),
        ];
        let batch = h.signatures(&windows);
        assert_eq!(batch[0], h.signature(&windows[0]));
        assert_eq!(batch[1], h.signature(&windows[1]));
    }
}
