//! Minhashing stage: signatures and hashband postings per document.
//!
//! One task per document. Each task loads the document's signatures from
//! the cache (computing and persisting them on first use), splits every
//! signature into strided bands, and writes the resulting posting set to
//! the store in a single flush.

use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::corpus::{Corpus, Document};
use crate::error::PipelineError;
use crate::minhash::Fingerprinter;
use crate::sigcache::SignatureCache;
use crate::store::{HashbandRow, Store};
use crate::text::TextCache;

/// Fingerprint every document and populate the Hashband relation.
pub fn build_hashbands(
    corpus: &Corpus,
    cfg: &RunConfig,
    texts: &TextCache,
    fingerprinter: &dyn Fingerprinter,
    signatures: &SignatureCache,
    store: &dyn Store,
) -> Result<(), PipelineError> {
    info!(documents = corpus.len(), "creating minhashes");
    corpus
        .documents()
        .par_iter()
        .map(|doc| {
            let rows = document_hashbands(doc, cfg, texts, fingerprinter, signatures);
            store.write_hashbands(&rows)?;
            Ok(())
        })
        .collect::<Result<Vec<()>, PipelineError>>()?;
    Ok(())
}

/// Signatures for one document, going through the cache.
///
/// Unreadable inputs are logged and skipped (the document simply emits no
/// postings); a corrupt cache file is recomputed and overwritten.
pub fn document_signatures(
    doc: &Document,
    texts: &TextCache,
    fingerprinter: &dyn Fingerprinter,
    signatures: &SignatureCache,
) -> Vec<Vec<u32>> {
    match signatures.load(&doc.path) {
        Ok(Some(cached)) => return cached,
        Ok(None) => {}
        Err(err) => {
            warn!(path = %doc.path.display(), error = %err, "signature cache unreadable; recomputing");
        }
    }

    let windows = match texts.windows(&doc.path) {
        Ok(windows) => windows,
        Err(err) => {
            warn!(path = %doc.path.display(), error = %err, "skipping unreadable document");
            return Vec::new();
        }
    };
    let computed = fingerprinter.signatures(&windows);
    if let Err(err) = signatures.store(&doc.path, &computed) {
        warn!(path = %doc.path.display(), error = %err, "failed to persist signature cache");
    }
    computed
}

fn document_hashbands(
    doc: &Document,
    cfg: &RunConfig,
    texts: &TextCache,
    fingerprinter: &dyn Fingerprinter,
    signatures: &SignatureCache,
) -> Vec<HashbandRow> {
    let sigs = document_signatures(doc, texts, fingerprinter, signatures);
    let mut rows = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for (window_id, signature) in sigs.iter().enumerate() {
        for band in signature_bands(signature, cfg.hashband_length, cfg.hashband_step) {
            // Set semantics: a band repeated within the document collapses
            // to one posting per window.
            if seen.insert((band.clone(), window_id as u32)) {
                rows.push(HashbandRow {
                    band,
                    doc_id: doc.id,
                    window_id: window_id as u32,
                });
            }
        }
    }
    rows
}

/// Band keys of one signature: the dot-joined entries at offsets
/// 0, T, 2T, … while the band still fits.
pub fn signature_bands(signature: &[u32], length: usize, step: usize) -> Vec<String> {
    if length == 0 || signature.len() < length {
        return Vec::new();
    }
    let step = step.max(1);
    let mut bands = Vec::new();
    let mut offset = 0;
    while offset + length <= signature.len() {
        let band = signature[offset..offset + length]
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(".");
        bands.push(band);
        offset += step;
    }
    bands
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_follow_stride() {
        let signature: Vec<u32> = (0..10).collect();
        let bands = signature_bands(&signature, 4, 3);
        assert_eq!(bands, vec!["0.1.2.3", "3.4.5.6", "6.7.8.9"]);
    }

    #[test]
    fn band_longer_than_signature_yields_nothing() {
        assert!(signature_bands(&[1, 2, 3], 4, 3).is_empty());
        assert!(signature_bands(&[], 4, 3).is_empty());
    }

    #[test]
    fn bands_are_deterministic_for_signature() {
        let signature: Vec<u32> = vec![9, 9, 1, 2, 9, 9];
        assert_eq!(
            signature_bands(&signature, 2, 2),
            signature_bands(&signature, 2, 2)
        );
    }
}
