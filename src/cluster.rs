//! Grouping verified matches into contiguous passage clusters.
//!
//! Per document pair, the matched window ids on each side are decomposed
//! into maximal runs of consecutive integers, and every run×run
//! combination that contains at least one verified match becomes a
//! cluster. The product keeps diagonal alignments expressible: a
//! contiguous passage in A can map onto a contiguous passage in B even
//! when only part of the Cartesian product actually matched.

use std::collections::{BTreeSet, HashMap};

/// One passage cluster for a document pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    /// Sorted unique A-side window ids that actually matched.
    pub a: Vec<u32>,
    /// Sorted unique B-side window ids that actually matched.
    pub b: Vec<u32>,
    /// Integer mean of the contributing similarities.
    pub similarity: u32,
}

/// Decompose ids into maximal runs of consecutive integers, sorted.
pub fn sequences(ids: &[u32]) -> Vec<Vec<u32>> {
    let mut runs: Vec<Vec<u32>> = Vec::new();
    for id in ids.iter().copied().collect::<BTreeSet<u32>>() {
        match runs.last_mut() {
            Some(run) if run.last() == Some(&(id.wrapping_sub(1))) => run.push(id),
            _ => runs.push(vec![id]),
        }
    }
    runs
}

/// Form clusters from `(window_a, window_b, similarity)` rows, dropping
/// clusters whose mean similarity falls below `min_sim`.
pub fn form_clusters(matches: &[(u32, u32, u32)], min_sim: u32) -> Vec<Cluster> {
    if matches.is_empty() {
        return Vec::new();
    }
    let mut by_pair: HashMap<u32, HashMap<u32, u32>> = HashMap::new();
    let mut a_ids = Vec::with_capacity(matches.len());
    let mut b_ids = Vec::with_capacity(matches.len());
    for &(window_a, window_b, sim) in matches {
        by_pair.entry(window_a).or_default().insert(window_b, sim);
        a_ids.push(window_a);
        b_ids.push(window_b);
    }

    let mut clusters = Vec::new();
    for a_run in sequences(&a_ids) {
        for b_run in sequences(&b_ids) {
            let mut a_members = BTreeSet::new();
            let mut b_members = BTreeSet::new();
            let mut sims: Vec<u32> = Vec::new();
            for &a_id in &a_run {
                let Some(row) = by_pair.get(&a_id) else {
                    continue;
                };
                for &b_id in &b_run {
                    if let Some(&sim) = row.get(&b_id) {
                        a_members.insert(a_id);
                        b_members.insert(b_id);
                        sims.push(sim);
                    }
                }
            }
            if a_members.is_empty() || b_members.is_empty() {
                continue;
            }
            let mean = sims.iter().map(|&s| u64::from(s)).sum::<u64>() / sims.len() as u64;
            let mean = mean as u32;
            if mean < min_sim {
                continue;
            }
            clusters.push(Cluster {
                a: a_members.into_iter().collect(),
                b: b_members.into_iter().collect(),
                similarity: mean,
            });
        }
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_split_on_gaps() {
        assert_eq!(
            sequences(&[5, 1, 2, 3, 7, 8]),
            vec![vec![1, 2, 3], vec![5], vec![7, 8]]
        );
        assert!(sequences(&[]).is_empty());
    }

    #[test]
    fn sequences_deduplicate() {
        assert_eq!(sequences(&[2, 2, 3, 3]), vec![vec![2, 3]]);
    }

    #[test]
    fn diagonal_matches_form_one_cluster() {
        let matches = [(0, 10, 90), (1, 11, 92), (2, 12, 94)];
        let clusters = form_clusters(&matches, 50);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].a, vec![0, 1, 2]);
        assert_eq!(clusters[0].b, vec![10, 11, 12]);
        assert_eq!(clusters[0].similarity, 92);
    }

    #[test]
    fn separated_passages_form_separate_clusters() {
        // Two distinct passages: windows 0..2 ↔ 10..12 and 40..41 ↔ 70..71.
        let matches = [(0, 10, 80), (1, 11, 80), (40, 70, 90), (41, 71, 90)];
        let clusters = form_clusters(&matches, 50);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn cluster_members_are_exactly_the_matched_pairs() {
        // Run A = [0, 1], run B = [5, 6], but only (0,5) and (1,6) matched.
        let matches = [(0, 5, 70), (1, 6, 74)];
        let clusters = form_clusters(&matches, 50);
        assert_eq!(clusters.len(), 1);
        // Both ids appear because both matched; the unmatched cross pairs
        // (0,6) and (1,5) contribute nothing to the mean.
        assert_eq!(clusters[0].a, vec![0, 1]);
        assert_eq!(clusters[0].b, vec![5, 6]);
        assert_eq!(clusters[0].similarity, 72);
    }

    #[test]
    fn low_mean_clusters_are_dropped() {
        let matches = [(0, 0, 40), (1, 1, 45)];
        assert!(form_clusters(&matches, 50).is_empty());
    }

    #[test]
    fn mean_is_integer_floor() {
        let matches = [(0, 0, 51), (1, 1, 52)];
        let clusters = form_clusters(&matches, 50);
        assert_eq!(clusters[0].similarity, 51);
    }
}
