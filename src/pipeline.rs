//! Linear pipeline orchestration.
//!
//! Stages run in a fixed order with a hard barrier between them: a stage's
//! worker pool drains completely before the next stage starts, so every
//! consumer sees the full output of its producer. All stage dependencies
//! (store, fingerprinter, caches) are injected as handles from here.

use std::fs;

use tracing::info;

use crate::banish::banish_matches;
use crate::candidates::generate_candidates;
use crate::config::RunConfig;
use crate::corpus::Corpus;
use crate::counts::WordCounter;
use crate::error::PipelineError;
use crate::hashband::build_hashbands;
use crate::minhash::MinHasher;
use crate::report::{
    create_all_match_json, format_all_matches, write_run_config, write_texts, ReportContext,
};
use crate::sigcache::SignatureCache;
use crate::text::TextCache;
use crate::verify::verify_matches;

/// Run the whole pipeline over a prepared corpus.
pub fn run(corpus: &Corpus, cfg: &RunConfig) -> Result<(), PipelineError> {
    cfg.validate()?;
    prepare_output_directories(cfg)?;

    let texts = TextCache::new(cfg);
    let fingerprinter = MinHasher::from_config(cfg);
    let signatures = SignatureCache::open(&cfg.cache)?;
    let store = cfg.backend.build(&cfg.cache, true)?;

    build_hashbands(
        corpus,
        cfg,
        &texts,
        &fingerprinter,
        &signatures,
        store.as_ref(),
    )?;
    generate_candidates(cfg, corpus.focal_id(), store.as_ref())?;
    verify_matches(corpus, cfg, &texts, store.as_ref())?;
    banish_matches(&corpus.banished_ids(), cfg.banish_distance, store.as_ref())?;

    let counter = if cfg.compute_probabilities {
        Some(build_word_counts(corpus, &texts, cfg))
    } else {
        None
    };
    let ctx = ReportContext {
        corpus,
        cfg,
        texts: &texts,
        store: store.as_ref(),
        counter: counter.as_ref(),
    };
    format_all_matches(&ctx)?;
    create_all_match_json(&cfg.output, cfg.compute_probabilities)?;
    write_run_config(&ctx)?;
    write_texts(&ctx)?;
    info!("pipeline complete");
    Ok(())
}

/// Create the output tree, replacing any previous run's exports.
fn prepare_output_directories(cfg: &RunConfig) -> Result<(), PipelineError> {
    if cfg.output.exists() {
        fs::remove_dir_all(&cfg.output).map_err(|source| PipelineError::Output {
            path: cfg.output.clone(),
            source,
        })?;
    }
    for sub in ["matches", "scatterplots", "indices", "texts"] {
        let dir = cfg.output.join("api").join(sub);
        fs::create_dir_all(&dir).map_err(|source| PipelineError::Output {
            path: dir.clone(),
            source,
        })?;
    }
    fs::create_dir_all(&cfg.cache).map_err(|source| PipelineError::Output {
        path: cfg.cache.clone(),
        source,
    })?;
    Ok(())
}

fn build_word_counts(corpus: &Corpus, texts: &TextCache, cfg: &RunConfig) -> WordCounter {
    info!("computing word counts");
    let mut counter = WordCounter::with_budget_mb(cfg.counter_budget_mb);
    for doc in corpus.documents() {
        match texts.words(&doc.path) {
            Ok(words) => counter.add_all(words.iter().map(String::as_str)),
            Err(err) => {
                tracing::warn!(doc = doc.id, error = %err, "skipping unreadable document in word counts");
            }
        }
    }
    counter
}
