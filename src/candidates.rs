//! Candidate generation: cross-document window pairs sharing a band.
//!
//! The hashband relation is the largest artifact of a run, so it is paged
//! through in blocks of `batch_size` rows. Band groups never straddle a
//! block boundary (the tail group is carried into the next block), per-band
//! enumeration fans out across the worker pool, and the accumulated set is
//! flushed to the store every `write_frequency` rows. MinHash band
//! collision is the sole admission rule here; everything else is
//! canonicalization and filtering.

use std::collections::HashSet;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::store::{CandidateRow, HashbandRow, Store};

/// Enumerate candidates from the multi-document band stream and populate
/// the Candidate relation.
pub fn generate_candidates(
    cfg: &RunConfig,
    focal: Option<u32>,
    store: &dyn Store,
) -> Result<(), PipelineError> {
    info!("identifying match candidates");
    let mut block: Vec<HashbandRow> = Vec::with_capacity(cfg.batch_size);
    let mut pending: HashSet<CandidateRow> = HashSet::new();
    let mut total = 0usize;

    store.scan_hashbands(&mut |row| {
        let at_group_boundary = block
            .last()
            .map_or(false, |last| last.band != row.band);
        if block.len() >= cfg.batch_size && at_group_boundary {
            pending.extend(enumerate_block(&block, focal));
            block.clear();
            if pending.len() >= cfg.write_frequency {
                total += pending.len();
                flush(store, &mut pending)?;
            }
        }
        block.push(row);
        Ok(())
    })?;

    pending.extend(enumerate_block(&block, focal));
    total += pending.len();
    flush(store, &mut pending)?;
    debug!(candidates = total, "candidate generation complete");
    Ok(())
}

fn flush(store: &dyn Store, pending: &mut HashSet<CandidateRow>) -> Result<(), crate::error::StoreError> {
    if pending.is_empty() {
        return Ok(());
    }
    let mut rows: Vec<CandidateRow> = pending.drain().collect();
    rows.sort_unstable();
    store.write_candidates(&rows)
}

/// Enumerate all candidate pairs in a block of band-grouped rows.
fn enumerate_block(block: &[HashbandRow], focal: Option<u32>) -> Vec<CandidateRow> {
    band_groups(block)
        .par_iter()
        .flat_map_iter(|group| band_candidates(group, focal))
        .collect()
}

/// Split a band-grouped row slice into per-band slices.
fn band_groups<'a>(rows: &'a [HashbandRow]) -> Vec<&'a [HashbandRow]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for idx in 1..=rows.len() {
        if idx == rows.len() || rows[idx].band != rows[start].band {
            groups.push(&rows[start..idx]);
            start = idx;
        }
    }
    groups
}

/// Candidate pairs for one band's posting list.
///
/// Every document-distinct posting pair becomes a candidate, canonicalized
/// so `doc_a < doc_b`. In focal mode the band must contain the focal
/// document and each emitted pair must touch it.
fn band_candidates(postings: &[HashbandRow], focal: Option<u32>) -> Vec<CandidateRow> {
    // Postings are a set per document; duplicates collapsed upstream.
    if let Some(focal_id) = focal {
        if !postings.iter().any(|p| p.doc_id == focal_id) {
            return Vec::new();
        }
    }
    let mut out = Vec::new();
    for (idx, a) in postings.iter().enumerate() {
        for b in &postings[idx + 1..] {
            if a.doc_id == b.doc_id {
                continue;
            }
            if let Some(focal_id) = focal {
                if a.doc_id != focal_id && b.doc_id != focal_id {
                    continue;
                }
            }
            let row = if a.doc_id < b.doc_id {
                CandidateRow {
                    doc_a: a.doc_id,
                    doc_b: b.doc_id,
                    window_a: a.window_id,
                    window_b: b.window_id,
                }
            } else {
                CandidateRow {
                    doc_a: b.doc_id,
                    doc_b: a.doc_id,
                    window_a: b.window_id,
                    window_b: a.window_id,
                }
            };
            out.push(row);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(band: &str, doc: u32, window: u32) -> HashbandRow {
        HashbandRow {
            band: band.to_string(),
            doc_id: doc,
            window_id: window,
        }
    }

    #[test]
    fn pairs_are_canonicalized() {
        let rows = vec![posting("b", 3, 7), posting("b", 1, 2)];
        let pairs = band_candidates(&rows, None);
        assert_eq!(
            pairs,
            vec![CandidateRow {
                doc_a: 1,
                doc_b: 3,
                window_a: 2,
                window_b: 7,
            }]
        );
    }

    #[test]
    fn same_document_pairs_skipped() {
        let rows = vec![posting("b", 1, 0), posting("b", 1, 4), posting("b", 2, 9)];
        let pairs = band_candidates(&rows, None);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| p.doc_a != p.doc_b));
    }

    #[test]
    fn focal_mode_requires_focal_side() {
        let rows = vec![posting("b", 0, 0), posting("b", 1, 1), posting("b", 2, 2)];
        let pairs = band_candidates(&rows, Some(1));
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| p.doc_a == 1 || p.doc_b == 1));

        // A band that never touches the focal document is suppressed whole.
        assert!(band_candidates(&rows, Some(9)).is_empty());
    }

    #[test]
    fn band_groups_split_on_key_change() {
        let rows = vec![
            posting("a", 0, 0),
            posting("a", 1, 0),
            posting("b", 0, 1),
            posting("c", 1, 2),
        ];
        let groups = band_groups(&rows);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[2][0].band, "c");
    }

    #[test]
    fn block_enumeration_matches_per_band_union() {
        let rows = vec![
            posting("a", 0, 0),
            posting("a", 1, 3),
            posting("b", 2, 1),
            posting("b", 0, 5),
        ];
        let mut all = enumerate_block(&rows, None);
        all.sort_unstable();
        assert_eq!(
            all,
            vec![
                CandidateRow {
                    doc_a: 0,
                    doc_b: 1,
                    window_a: 0,
                    window_b: 3,
                },
                CandidateRow {
                    doc_a: 0,
                    doc_b: 2,
                    window_a: 5,
                    window_b: 1,
                },
            ]
        );
    }
}
