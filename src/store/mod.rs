//! Storage substrate for the three pipeline relations.
//!
//! The Hashband, Candidate, and Match relations are owned exclusively by
//! this module; every stage is a client that appends batches or consumes
//! ordered streams through the [`Store`] trait. Two backends are provided:
//! an embedded SQLite database tuned for write throughput, and a sharded
//! append-only file tree. Backend choice is a configuration enum, built the
//! same way regardless of which stage asks.

pub mod fs;
pub mod sql;

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// One posting in the Hashband relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashbandRow {
    /// Dot-joined band of consecutive signature entries.
    pub band: String,
    pub doc_id: u32,
    pub window_id: u32,
}

/// One entry in the Candidate relation. Always canonicalized so
/// `doc_a < doc_b`; the relation has set semantics on the full 4-tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateRow {
    pub doc_a: u32,
    pub doc_b: u32,
    pub window_a: u32,
    pub window_b: u32,
}

/// One verified match. `similarity` is an integer percent in 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchRow {
    pub doc_a: u32,
    pub doc_b: u32,
    pub window_a: u32,
    pub window_b: u32,
    pub similarity: u32,
}

/// Interface every storage backend must satisfy.
///
/// Writers serialize commits internally; the streaming methods provide the
/// orderings the stages rely on (bands grouped, pairs sorted). Consumers
/// must not depend on insertion order anywhere else.
pub trait Store: Send + Sync {
    fn write_hashbands(&self, rows: &[HashbandRow]) -> Result<(), StoreError>;
    fn write_candidates(&self, rows: &[CandidateRow]) -> Result<(), StoreError>;
    fn write_matches(&self, rows: &[MatchRow]) -> Result<(), StoreError>;

    /// Stream hashband postings grouped by band key, restricted to bands
    /// whose posting set spans at least two distinct documents. Bands with a
    /// single document produce no candidates and are suppressed here.
    fn scan_hashbands(
        &self,
        visitor: &mut dyn FnMut(HashbandRow) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;

    /// Distinct `(doc_a, doc_b)` pairs in the Candidate relation, sorted
    /// lexicographically.
    fn candidate_pairs(&self) -> Result<Vec<(u32, u32)>, StoreError>;

    /// Distinct `(window_a, window_b)` pairs for one document pair.
    fn candidate_windows(&self, doc_a: u32, doc_b: u32) -> Result<Vec<(u32, u32)>, StoreError>;

    /// Distinct `(doc_a, doc_b)` pairs in the Match relation, sorted.
    fn match_pairs(&self) -> Result<Vec<(u32, u32)>, StoreError>;

    /// All match rows for one document pair.
    fn pair_matches(&self, doc_a: u32, doc_b: u32) -> Result<Vec<MatchRow>, StoreError>;

    /// Every match row in the relation.
    fn all_matches(&self) -> Result<Vec<MatchRow>, StoreError>;

    /// Delete every match row with either endpoint in `endpoints`.
    fn delete_matches(&self, endpoints: &HashSet<(u32, u32)>) -> Result<(), StoreError>;
}

/// Which backend owns the relations for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Embedded SQLite database under the cache directory.
    #[default]
    Sqlite,
    /// Sharded append-only files under the cache directory.
    FileTree,
}

impl StoreBackend {
    /// Open the configured backend. `initialize` clears any relations left
    /// over from a previous run.
    pub fn build(&self, cache_dir: &Path, initialize: bool) -> Result<Box<dyn Store>, StoreError> {
        match self {
            StoreBackend::Sqlite => Ok(Box::new(sql::SqlStore::open(cache_dir, initialize)?)),
            StoreBackend::FileTree => Ok(Box::new(fs::FileStore::open(cache_dir, initialize)?)),
        }
    }
}
