//! Text reuse detection over a document corpus.
//!
//! Given a set of plain-text or lightly tagged documents, the pipeline
//! reports clusters of near-identical passages between every pair of
//! documents and persists the clusters with their source excerpts. The
//! all-pairs comparison is made tractable by locality-sensitive hashing:
//! every sliding window of words is fingerprinted with a character-shingle
//! MinHash, signatures are banded into an inverted index, and only window
//! pairs that collide in at least one band are verified with an exact
//! string similarity.
//!
//! The stages are a single linear pipeline:
//!
//! ```text
//! documents -> windows -> signatures -> band postings -> candidate pairs
//!           -> verified matches -> clusters -> (banish filter) -> exports
//! ```
//!
//! Each stage fans out over a worker pool and communicates with its
//! neighbors only through the storage substrate ([`store::Store`]), which
//! owns the Hashband, Candidate, and Match relations. [`pipeline::run`]
//! wires everything together; the `textreuse` binary adds argument parsing
//! on top.
//!
//! ## Library use
//!
//! ```no_run
//! use std::collections::BTreeSet;
//! use textreuse::config::RunConfig;
//! use textreuse::corpus::Corpus;
//!
//! # fn demo() -> Result<(), textreuse::error::PipelineError> {
//! let corpus = Corpus::new(
//!     vec!["texts/a.txt".into(), "texts/b.txt".into()],
//!     &BTreeSet::new(),
//!     &BTreeSet::new(),
//!     None,
//!     serde_json::Map::new(),
//! );
//! let config = RunConfig::default();
//! textreuse::pipeline::run(&corpus, &config)?;
//! # Ok(())
//! # }
//! ```

pub mod banish;
pub mod candidates;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod corpus;
pub mod counts;
pub mod error;
pub mod hashband;
pub mod minhash;
pub mod pipeline;
pub mod report;
pub mod sigcache;
pub mod store;
pub mod text;
pub mod verify;

pub use config::RunConfig;
pub use corpus::{Corpus, Document, Role};
pub use error::PipelineError;
pub use minhash::{Fingerprinter, MinHasher};
pub use store::{Store, StoreBackend};
pub use verify::SimilarityMetric;
