//! Run configuration for the text reuse pipeline.
//!
//! All pipeline behavior is a pure function of `(corpus, RunConfig)`. The
//! config is built once by the CLI layer, validated up front, and then passed
//! by reference through every stage; nothing reads configuration from the
//! environment after startup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::store::StoreBackend;
use crate::verify::SimilarityMetric;

/// Configuration for a single pipeline run.
///
/// When two configs are equal and the corpus bytes are equal, the produced
/// match set is byte-identical. The fingerprint seed is part of that
/// contract and must not vary by platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Words per window.
    pub window_length: usize,
    /// Window stride in words.
    pub slide_length: usize,
    /// Character shingle length fed to MinHash.
    pub chargram_length: usize,
    /// Number of MinHash permutations per signature.
    pub num_permutations: usize,
    /// Signature entries per hashband.
    pub hashband_length: usize,
    /// Band stride across the signature.
    pub hashband_step: usize,
    /// Minimum similarity (integer percent, 1..=100) for a verified match.
    pub min_sim: u32,
    /// Skip pairs whose match count exceeds this percentage of either
    /// file's window count. Shares the percent scale with `min_sim`.
    pub max_file_sim: Option<u32>,
    /// Graph distance for banish propagation.
    pub banish_distance: u32,
    /// Fold text to its NFKD base characters before tokenization.
    pub strip_diacritics: bool,
    /// Restrict extraction to the content of this tag.
    pub xml_base_tag: Option<String>,
    /// Tags whose subtrees are dropped during extraction.
    pub xml_remove_tags: Vec<String>,
    /// Tag treated as a page delimiter when mapping windows to pages.
    pub xml_page_tag: Option<String>,
    /// Attribute of `xml_page_tag` carrying the page identifier.
    pub xml_page_attr: Option<String>,
    /// Output directory for the viewer-facing JSON tree.
    pub output: PathBuf,
    /// Cache directory (signature cache and the store live here).
    pub cache: PathBuf,
    /// Storage backend for the three relations.
    pub backend: StoreBackend,
    /// Similarity metric used by the verifier.
    pub metric: SimilarityMetric,
    /// Shortest common substring the greedy metric will still credit.
    pub greedy_min_len: usize,
    /// Compute word-frequency probabilities for match records.
    pub compute_probabilities: bool,
    /// Memory budget in MB for the approximate word counter.
    pub counter_budget_mb: usize,
    /// Hashband rows per candidate-generation block.
    pub batch_size: usize,
    /// Accumulated candidate rows per store flush.
    pub write_frequency: usize,
    /// Hash seed for fingerprinting.
    pub seed: u64,
}

/// Fixed fingerprint seed. Changing it invalidates every signature cache.
pub const DEFAULT_SEED: u64 = 0xC0FF_EE11_D00D_F00D;

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            window_length: 14,
            slide_length: 4,
            chargram_length: 4,
            num_permutations: 256,
            hashband_length: 4,
            hashband_step: 3,
            min_sim: 50,
            max_file_sim: None,
            banish_distance: 4,
            strip_diacritics: false,
            xml_base_tag: None,
            xml_remove_tags: Vec::new(),
            xml_page_tag: None,
            xml_page_attr: None,
            output: PathBuf::from("output"),
            cache: PathBuf::from("cache"),
            backend: StoreBackend::default(),
            metric: SimilarityMetric::default(),
            greedy_min_len: 5,
            compute_probabilities: false,
            counter_budget_mb: 64,
            batch_size: 100_000,
            write_frequency: 100_000,
            seed: DEFAULT_SEED,
        }
    }
}

impl RunConfig {
    /// Validate cross-field constraints. Field-local range checks happen at
    /// the CLI boundary; everything here can only be checked once the whole
    /// config is assembled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_sim < 1 || self.min_sim > 100 {
            return Err(ConfigError::InvalidMinSim {
                value: i64::from(self.min_sim),
            });
        }
        if let Some(max_file_sim) = self.max_file_sim {
            if self.min_sim > max_file_sim {
                return Err(ConfigError::MaxFileSimBelowMinSim {
                    max_file_sim,
                    min_sim: self.min_sim,
                });
            }
        }
        if self.hashband_length > self.num_permutations {
            return Err(ConfigError::HashbandTooLong {
                length: self.hashband_length,
                permutations: self.num_permutations,
            });
        }
        Ok(())
    }

    /// Number of hashbands per signature: offsets 0, T, 2T, … while the band
    /// still fits inside the signature.
    pub fn bands_per_signature(&self) -> usize {
        if self.hashband_length > self.num_permutations {
            return 0;
        }
        let last_offset = self.num_permutations - self.hashband_length;
        last_offset / self.hashband_step.max(1) + 1
    }
}
