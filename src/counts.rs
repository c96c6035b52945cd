//! Memory-bounded word frequency counting.
//!
//! The `probability` field on match records is advisory: it only needs a
//! frequency estimate good enough to rank passages by how unremarkable
//! their vocabulary is. A count-min sketch keeps the counter inside a
//! fixed memory budget regardless of corpus vocabulary size;
//! overestimation from hash collisions is acceptable for this use.

use xxhash_rust::xxh3::xxh3_64_with_seed;

const DEPTH: usize = 4;

/// Count-min sketch over corpus words.
pub struct WordCounter {
    width: usize,
    rows: Vec<Vec<u32>>,
    total: u64,
}

impl WordCounter {
    /// Build a counter bounded by roughly `budget_mb` megabytes.
    pub fn with_budget_mb(budget_mb: usize) -> Self {
        let budget_bytes = budget_mb.max(1) * 1024 * 1024;
        let width = (budget_bytes / (DEPTH * std::mem::size_of::<u32>())).max(1024);
        Self {
            width,
            rows: vec![vec![0u32; width]; DEPTH],
            total: 0,
        }
    }

    fn slot(&self, word: &str, row: usize) -> usize {
        (xxh3_64_with_seed(word.as_bytes(), row as u64) % self.width as u64) as usize
    }

    pub fn add(&mut self, word: &str) {
        for row in 0..DEPTH {
            let slot = self.slot(word, row);
            self.rows[row][slot] = self.rows[row][slot].saturating_add(1);
        }
        self.total += 1;
    }

    pub fn add_all<'a>(&mut self, words: impl IntoIterator<Item = &'a str>) {
        for word in words {
            self.add(word);
        }
    }

    /// Estimated count; the minimum across rows bounds collision error.
    pub fn estimate(&self, word: &str) -> u64 {
        (0..DEPTH)
            .map(|row| u64::from(self.rows[row][self.slot(word, row)]))
            .min()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Sum of per-word corpus probabilities over the words of `text`.
    pub fn probability_sum(&self, text: &str) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        text.split_whitespace()
            .map(|w| self.estimate(w) as f64 / self.total as f64)
            .sum()
    }
}

/// Advisory match probability: the larger of the two passages' probability
/// sums, rounded to three decimals and scaled by 1000. Returns -1 when
/// counting was not requested.
pub fn string_probability(a: &str, b: &str, counter: Option<&WordCounter>) -> f64 {
    match counter {
        None => -1.0,
        Some(counter) => {
            let best = counter
                .probability_sum(a)
                .max(counter.probability_sum(b));
            (best * 1000.0).round()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_at_least_exact() {
        let mut counter = WordCounter::with_budget_mb(1);
        counter.add_all(["the", "the", "quick", "fox"]);
        assert!(counter.estimate("the") >= 2);
        assert!(counter.estimate("quick") >= 1);
        assert_eq!(counter.total(), 4);
    }

    #[test]
    fn unseen_words_estimate_zero_in_sparse_sketch() {
        let mut counter = WordCounter::with_budget_mb(1);
        counter.add_all(["alpha", "beta"]);
        assert_eq!(counter.estimate("gamma"), 0);
    }

    #[test]
    fn probability_takes_the_larger_side() {
        let mut counter = WordCounter::with_budget_mb(1);
        counter.add_all(["common", "common", "common", "rare"]);
        let p = string_probability("common common", "rare", Some(&counter));
        // Two occurrences of a word with p=0.75 sum to 1.5 -> 1500.
        assert_eq!(p, 1500.0);
    }

    #[test]
    fn probability_is_minus_one_without_counter() {
        assert_eq!(string_probability("a", "b", None), -1.0);
    }
}
