//! Command-line front end.
//!
//! Resolves the file globs into the canonical document set (sorted order
//! fixes the document ids, banished files are appended after the main
//! set), loads metadata, and assembles a validated [`RunConfig`]. Every
//! argument error is reported before any work begins.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::RunConfig;
use crate::corpus::Corpus;
use crate::error::ConfigError;
use crate::store::StoreBackend;
use crate::verify::SimilarityMetric;

/// Discover and visualize text reuse.
#[derive(Parser, Debug)]
#[command(name = "textreuse", version, about)]
pub struct Cli {
    /// Glob of text files to process
    #[arg(long, short = 'i', value_name = "GLOB")]
    pub infiles: String,

    /// Glob of text files to banish from matches
    #[arg(long, short = 'b', value_name = "GLOB")]
    pub banish: Option<String>,

    /// Glob of text files to exclude from matches
    #[arg(long, value_name = "GLOB")]
    pub exclude: Option<String>,

    /// Only retain matches that include text from this file
    #[arg(long, value_name = "PATH")]
    pub only: Option<PathBuf>,

    /// JSON metadata file keyed by file basename
    #[arg(long, short = 'm', value_name = "PATH")]
    pub metadata: Option<PathBuf>,

    /// Window length in words
    #[arg(long = "window_length", short = 'w', default_value_t = 14)]
    pub window_length: usize,

    /// Length to slide windows in words
    #[arg(long = "slide_length", short = 'l', default_value_t = 4)]
    pub slide_length: usize,

    /// Characters per character shingle
    #[arg(long = "chargram_length", default_value_t = 4)]
    pub chargram_length: usize,

    /// MinHash values per hashband
    #[arg(long = "hashband_length", default_value_t = 4)]
    pub hashband_length: usize,

    /// MinHash units to slide hashband windows
    #[arg(long = "hashband_step", default_value_t = 3)]
    pub hashband_step: usize,

    /// Minimum similarity of matches to retain (1..=100)
    #[arg(long = "min_sim", short = 's', default_value_t = 50)]
    pub min_sim: i64,

    /// Maximum file similarity percent for which matches are retained
    #[arg(long = "max_file_sim")]
    pub max_file_sim: Option<u32>,

    /// Graph distance to travel when banishing linked matches
    #[arg(long = "banish_distance", default_value_t = 4)]
    pub banish_distance: u32,

    /// Strip diacritics from texts during processing
    #[arg(long = "strip_diacritics")]
    pub strip_diacritics: bool,

    /// Extract text within this XML tag
    #[arg(long = "xml_base_tag", value_name = "TAG")]
    pub xml_base_tag: Option<String>,

    /// XML tags whose content is removed during extraction
    #[arg(long = "xml_remove_tags", value_name = "TAGS", value_delimiter = ',')]
    pub xml_remove_tags: Vec<String>,

    /// XML tag treated as a page delimiter for URLs
    #[arg(long = "xml_page_tag", value_name = "TAG")]
    pub xml_page_tag: Option<String>,

    /// Attribute of the page tag carrying the page id
    #[arg(long = "xml_page_attr", value_name = "ATTR")]
    pub xml_page_attr: Option<String>,

    /// Output location
    #[arg(long, short = 'o', default_value = "output")]
    pub output: PathBuf,

    /// Cache location
    #[arg(long, short = 'c', default_value = "cache")]
    pub cache: PathBuf,

    /// Storage backend for the intermediate relations
    #[arg(long, value_enum, default_value_t = BackendArg::Sqlite)]
    pub backend: BackendArg,

    /// Use the greedy longest-match validation algorithm
    #[arg(long = "improved_match_algo")]
    pub improved_match_algo: bool,

    /// Compute the likelihood of strings in the corpus
    #[arg(long = "compute_probabilities")]
    pub compute_probabilities: bool,

    /// Memory in MB allocated to the word counter
    #[arg(long = "bounter_size", default_value_t = 64)]
    pub bounter_size: usize,

    /// Hashband rows per candidate-generation block
    #[arg(long = "batch_size", default_value_t = 100_000)]
    pub batch_size: usize,

    /// Candidate rows accumulated per store flush
    #[arg(long = "write_frequency", default_value_t = 100_000)]
    pub write_frequency: usize,

    /// Log more operations
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Sqlite,
    Files,
}

impl From<BackendArg> for StoreBackend {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Sqlite => StoreBackend::Sqlite,
            BackendArg::Files => StoreBackend::FileTree,
        }
    }
}

impl Cli {
    /// Resolve globs and metadata into the corpus plus a validated config.
    pub fn resolve(self) -> Result<(RunConfig, Corpus), ConfigError> {
        if self.min_sim < 1 || self.min_sim > 100 {
            return Err(ConfigError::InvalidMinSim { value: self.min_sim });
        }

        let mut infiles = non_empty_glob(&self.infiles)?;

        let mut banished_ids = BTreeSet::new();
        if let Some(pattern) = self.banish.as_deref().filter(|p| !p.is_empty()) {
            let banish_files = non_empty_glob(pattern)?;
            let banish_set: HashSet<PathBuf> = banish_files.iter().cloned().collect();
            for file in banish_files {
                if !infiles.contains(&file) {
                    infiles.push(file);
                }
            }
            for (idx, file) in infiles.iter().enumerate() {
                if banish_set.contains(file) {
                    banished_ids.insert(idx as u32);
                }
            }
        }

        let mut excluded_ids = BTreeSet::new();
        if let Some(pattern) = self.exclude.as_deref().filter(|p| !p.is_empty()) {
            let exclude_set: HashSet<PathBuf> = non_empty_glob(pattern)?.into_iter().collect();
            for (idx, file) in infiles.iter().enumerate() {
                if exclude_set.contains(file) {
                    excluded_ids.insert(idx as u32);
                }
            }
        }

        let focal_id = match &self.only {
            None => None,
            Some(path) => Some(
                infiles
                    .iter()
                    .position(|f| f == path)
                    .map(|idx| idx as u32)
                    .ok_or_else(|| ConfigError::OnlyNotInInfiles { path: path.clone() })?,
            ),
        };

        if self.xml_page_tag.is_some() && self.metadata.is_none() {
            return Err(ConfigError::PageTagRequiresMetadata);
        }

        let raw_metadata = match &self.metadata {
            None => serde_json::Map::new(),
            Some(path) => {
                let content =
                    fs::read_to_string(path).map_err(|_| ConfigError::MetadataNotFound {
                        path: path.clone(),
                    })?;
                let value: serde_json::Value =
                    serde_json::from_str(&content).map_err(|source| ConfigError::MetadataParse {
                        path: path.clone(),
                        source,
                    })?;
                value.as_object().cloned().unwrap_or_default()
            }
        };

        let config = RunConfig {
            window_length: self.window_length,
            slide_length: self.slide_length,
            chargram_length: self.chargram_length,
            hashband_length: self.hashband_length,
            hashband_step: self.hashband_step,
            min_sim: self.min_sim as u32,
            max_file_sim: self.max_file_sim,
            banish_distance: self.banish_distance,
            strip_diacritics: self.strip_diacritics,
            xml_base_tag: self.xml_base_tag,
            xml_remove_tags: self.xml_remove_tags,
            xml_page_tag: self.xml_page_tag,
            xml_page_attr: self.xml_page_attr,
            output: self.output,
            cache: self.cache,
            backend: self.backend.into(),
            metric: if self.improved_match_algo {
                SimilarityMetric::GreedyLongestMatch
            } else {
                SimilarityMetric::Ratio
            },
            compute_probabilities: self.compute_probabilities,
            counter_budget_mb: self.bounter_size,
            batch_size: self.batch_size.max(1),
            write_frequency: self.write_frequency.max(1),
            ..RunConfig::default()
        };
        config.validate()?;

        let corpus = Corpus::new(infiles, &banished_ids, &excluded_ids, focal_id, raw_metadata);
        Ok((config, corpus))
    }
}

/// Expand a glob, sorted lexicographically; empty expansions are argument
/// errors.
fn non_empty_glob(pattern: &str) -> Result<Vec<PathBuf>, ConfigError> {
    let paths = glob::glob(pattern)
        .map_err(|source| ConfigError::BadGlob {
            pattern: pattern.to_string(),
            source,
        })?
        .filter_map(Result::ok)
        .collect::<BTreeSet<PathBuf>>();
    if paths.is_empty() {
        return Err(ConfigError::NoInfiles {
            pattern: pattern.to_string(),
        });
    }
    Ok(paths.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Role;

    fn write_corpus(dir: &std::path::Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), "some words in a file").unwrap();
        }
    }

    fn base_cli(dir: &std::path::Path) -> Cli {
        Cli::parse_from([
            "textreuse",
            "--infiles",
            &format!("{}/*.txt", dir.display()),
        ])
    }

    #[test]
    fn glob_order_fixes_document_ids() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path(), &["b.txt", "a.txt", "c.txt"]);
        let (_, corpus) = base_cli(dir.path()).resolve().unwrap();
        assert_eq!(corpus.basename(0), "a.txt");
        assert_eq!(corpus.basename(1), "b.txt");
        assert_eq!(corpus.basename(2), "c.txt");
    }

    #[test]
    fn empty_glob_is_an_argument_error() {
        let dir = tempfile::tempdir().unwrap();
        let cli = base_cli(dir.path());
        assert!(matches!(cli.resolve(), Err(ConfigError::NoInfiles { .. })));
    }

    #[test]
    fn min_sim_out_of_range_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path(), &["a.txt"]);
        let mut cli = base_cli(dir.path());
        cli.min_sim = 0;
        assert!(matches!(
            cli.resolve(),
            Err(ConfigError::InvalidMinSim { value: 0 })
        ));
    }

    #[test]
    fn page_tag_requires_metadata() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path(), &["a.txt"]);
        let mut cli = base_cli(dir.path());
        cli.xml_page_tag = Some("pb".into());
        assert!(matches!(
            cli.resolve(),
            Err(ConfigError::PageTagRequiresMetadata)
        ));
    }

    #[test]
    fn max_file_sim_below_min_sim_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path(), &["a.txt"]);
        let mut cli = base_cli(dir.path());
        cli.max_file_sim = Some(1);
        assert!(matches!(
            cli.resolve(),
            Err(ConfigError::MaxFileSimBelowMinSim { .. })
        ));
    }

    #[test]
    fn banished_files_are_appended_with_roles() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path(), &["a.txt", "b.txt"]);
        let banish_dir = tempfile::tempdir().unwrap();
        write_corpus(banish_dir.path(), &["z.txt"]);

        let mut cli = base_cli(dir.path());
        cli.banish = Some(format!("{}/*.txt", banish_dir.path().display()));
        let (_, corpus) = cli.resolve().unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.role(2), Role::Banished);
        assert_eq!(corpus.basename(2), "z.txt");
    }

    #[test]
    fn only_must_name_an_infile() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path(), &["a.txt"]);
        let mut cli = base_cli(dir.path());
        cli.only = Some(PathBuf::from("missing.txt"));
        assert!(matches!(
            cli.resolve(),
            Err(ConfigError::OnlyNotInInfiles { .. })
        ));

        let mut cli = base_cli(dir.path());
        cli.only = Some(dir.path().join("a.txt"));
        let (_, corpus) = cli.resolve().unwrap();
        assert_eq!(corpus.focal_id(), Some(0));
    }

    #[test]
    fn improved_match_algo_selects_greedy_metric() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path(), &["a.txt"]);
        let mut cli = base_cli(dir.path());
        cli.improved_match_algo = true;
        let (config, _) = cli.resolve().unwrap();
        assert_eq!(config.metric, SimilarityMetric::GreedyLongestMatch);
    }
}
