//! Error types for the text reuse pipeline.
//!
//! Each concern defines its own error enum; the stages converge on
//! [`PipelineError`] so the binary can report a single failure with its
//! source chain intact.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while resolving and validating the run configuration.
///
/// All of these are reported before any work begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no files matched the infile glob {pattern:?}")]
    NoInfiles { pattern: String },

    #[error("invalid glob pattern {pattern:?}: {source}")]
    BadGlob {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("min_sim must satisfy 1 <= min_sim <= 100 (got {value})")]
    InvalidMinSim { value: i64 },

    #[error("--xml_page_tag requires --metadata to be provided")]
    PageTagRequiresMetadata,

    #[error("max_file_sim ({max_file_sim}) can not be smaller than min_sim ({min_sim})")]
    MaxFileSimBelowMinSim { max_file_sim: u32, min_sim: u32 },

    #[error("--only file {path:?} is not part of the infile set")]
    OnlyNotInInfiles { path: PathBuf },

    #[error("metadata file should be an existing JSON file: {path:?}")]
    MetadataNotFound { path: PathBuf },

    #[error("failed to parse metadata file {path:?}: {source}")]
    MetadataParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("hashband_length ({length}) can not exceed the number of permutations ({permutations})")]
    HashbandTooLong { length: usize, permutations: usize },
}

/// Errors raised by text extraction and windowing.
///
/// Malformed markup is not an error: extraction keeps whatever was parsed
/// and logs the rest, so only the file read itself can fail.
#[derive(Debug, Error)]
pub enum TextError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors raised by the storage substrate.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sql error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("store i/o error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed row {row:?} in {path:?}")]
    MalformedRow { row: String, path: PathBuf },
}

/// Errors raised by the signature cache.
#[derive(Debug, Error)]
pub enum SigCacheError {
    #[error("signature cache i/o error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt signature cache file {path:?}")]
    Corrupt { path: PathBuf },
}

/// Top-level pipeline failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("text extraction failure: {0}")]
    Text(#[from] TextError),

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("signature cache failure: {0}")]
    SigCache(#[from] SigCacheError),

    #[error("output i/o error at {path:?}: {source}")]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("output serialization error: {0}")]
    OutputJson(#[from] serde_json::Error),
}
