//! Viewer-facing JSON exports.
//!
//! The verified match relation is clustered per document pair, formatted
//! into full match records, merged into one file per document, and
//! summarized into sort indices and scatterplot aggregates. Every file in
//! the `api/` tree is written through a temp-then-rename so a reader never
//! observes a half-written export.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cluster::{form_clusters, Cluster};
use crate::config::RunConfig;
use crate::corpus::{Corpus, Role};
use crate::counts::{string_probability, WordCounter};
use crate::error::PipelineError;
use crate::store::Store;
use crate::text::TextCache;

/// One exported match record. Field names are a contract with the viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    /// UUID while per-pair files exist; replaced by a dense integer when
    /// the per-document files are merged.
    #[serde(rename = "_id")]
    pub id: Value,
    pub similarity: u32,
    pub probability: f64,
    pub source_file_id: u32,
    pub target_file_id: u32,
    pub source_segment_ids: Vec<u32>,
    pub target_segment_ids: Vec<u32>,
    pub source_filename: String,
    pub target_filename: String,
    pub source_file_path: String,
    pub target_file_path: String,
    pub source_prematch: String,
    pub target_prematch: String,
    pub source_match: String,
    pub target_match: String,
    pub source_postmatch: String,
    pub target_postmatch: String,
    pub source_year: String,
    pub target_year: String,
    pub source_author: String,
    pub target_author: String,
    pub source_title: String,
    pub target_title: String,
    pub source_url: String,
    pub target_url: String,
}

/// Everything the reporting stage needs, injected by the pipeline.
pub struct ReportContext<'a> {
    pub corpus: &'a Corpus,
    pub cfg: &'a RunConfig,
    pub texts: &'a TextCache,
    pub store: &'a dyn Store,
    pub counter: Option<&'a WordCounter>,
}

/// Format every matching pair into per-pair JSON files under the per
/// document match directories.
pub fn format_all_matches(ctx: &ReportContext<'_>) -> Result<(), PipelineError> {
    info!("formatting matches");
    let matches_root = ctx.cfg.output.join("api").join("matches");
    for doc in ctx.corpus.documents() {
        let dir = matches_root.join(doc.id.to_string());
        fs::create_dir_all(&dir).map_err(|source| PipelineError::Output {
            path: dir.clone(),
            source,
        })?;
    }

    let pairs = ctx.store.match_pairs()?;
    pairs
        .par_iter()
        .map(|&(doc_a, doc_b)| format_pair(ctx, doc_a, doc_b))
        .collect::<Result<Vec<()>, PipelineError>>()?;
    Ok(())
}

fn format_pair(ctx: &ReportContext<'_>, doc_a: u32, doc_b: u32) -> Result<(), PipelineError> {
    if ctx.corpus.role(doc_a) == Role::Excluded || ctx.corpus.role(doc_b) == Role::Excluded {
        return Ok(());
    }
    let rows = ctx.store.pair_matches(doc_a, doc_b)?;
    if rows.is_empty() {
        return Ok(());
    }

    if let Some(max_file_sim) = ctx.cfg.max_file_sim {
        let windows_a = ctx.texts.windows(ctx.corpus.path(doc_a))?;
        let windows_b = ctx.texts.windows(ctx.corpus.path(doc_b))?;
        let cap = f64::from(max_file_sim) / 100.0;
        let count = rows.len() as f64;
        if count > windows_a.len() as f64 * cap || count > windows_b.len() as f64 * cap {
            info!(doc_a, doc_b, "pair exceeds max_file_sim; skipping");
            return Ok(());
        }
    }

    let triples: Vec<(u32, u32, u32)> = rows
        .iter()
        .map(|r| (r.window_a, r.window_b, r.similarity))
        .collect();
    let clusters = form_clusters(&triples, ctx.cfg.min_sim);
    let records = build_records(ctx, doc_a, doc_b, clusters)?;

    // Save under both documents; the merge step reunifies the ids.
    let matches_root = ctx.cfg.output.join("api").join("matches");
    let file_name = format!("{doc_a}-{doc_b}.json");
    for doc in [doc_a, doc_b] {
        let path = matches_root.join(doc.to_string()).join(&file_name);
        write_json_atomic(&path, &records)?;
    }
    Ok(())
}

/// Format clusters into full records, orienting the source side to the
/// earlier-published document when both years are known.
fn build_records(
    ctx: &ReportContext<'_>,
    doc_a: u32,
    doc_b: u32,
    clusters: Vec<Cluster>,
) -> Result<Vec<MatchRecord>, PipelineError> {
    let year_a = ctx.corpus.meta(doc_a).year_ord();
    let year_b = ctx.corpus.meta(doc_b).year_ord();
    let swap = matches!((year_a, year_b), (Some(a), Some(b)) if b < a);
    let (src, tgt) = if swap { (doc_b, doc_a) } else { (doc_a, doc_b) };

    let src_words = ctx.texts.display_words(ctx.corpus.path(src))?;
    let tgt_words = ctx.texts.display_words(ctx.corpus.path(tgt))?;
    let src_pages = load_page_map(ctx, src);
    let tgt_pages = load_page_map(ctx, tgt);
    let src_meta = ctx.corpus.meta(src);
    let tgt_meta = ctx.corpus.meta(tgt);

    let mut records = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        let (src_ids, tgt_ids) = if swap {
            (cluster.b, cluster.a)
        } else {
            (cluster.a, cluster.b)
        };
        let src_strings = match_strings(
            &src_words,
            &src_ids,
            ctx.cfg.slide_length,
            ctx.cfg.window_length,
        );
        let tgt_strings = match_strings(
            &tgt_words,
            &tgt_ids,
            ctx.cfg.slide_length,
            ctx.cfg.window_length,
        );
        records.push(MatchRecord {
            id: Value::String(Uuid::new_v4().to_string()),
            similarity: cluster.similarity,
            probability: string_probability(&src_strings.matched, &tgt_strings.matched, ctx.counter),
            source_file_id: src,
            target_file_id: tgt,
            source_filename: ctx.corpus.basename(src),
            target_filename: ctx.corpus.basename(tgt),
            source_file_path: ctx.corpus.path(src).to_string_lossy().into_owned(),
            target_file_path: ctx.corpus.path(tgt).to_string_lossy().into_owned(),
            source_prematch: src_strings.prematch,
            target_prematch: tgt_strings.prematch,
            source_match: src_strings.matched,
            target_match: tgt_strings.matched,
            source_postmatch: src_strings.postmatch,
            target_postmatch: tgt_strings.postmatch,
            source_year: src_meta.year_display(),
            target_year: tgt_meta.year_display(),
            source_author: src_meta.author().to_string(),
            target_author: tgt_meta.author().to_string(),
            source_title: src_meta.title().to_string(),
            target_title: tgt_meta.title().to_string(),
            source_url: page_url(src_meta.url(), &src_pages, &src_ids, ctx.cfg),
            target_url: page_url(tgt_meta.url(), &tgt_pages, &tgt_ids, ctx.cfg),
            source_segment_ids: src_ids,
            target_segment_ids: tgt_ids,
        });
    }
    Ok(records)
}

fn load_page_map(ctx: &ReportContext<'_>, doc: u32) -> HashMap<u32, String> {
    match ctx.texts.page_map(ctx.corpus.path(doc)) {
        Ok(map) => (*map).clone(),
        Err(err) => {
            warn!(doc, error = %err, "unable to map windows to page ids");
            HashMap::new()
        }
    }
}

struct MatchStrings {
    prematch: String,
    matched: String,
    postmatch: String,
}

/// Pre/match/post contexts around the matched windows, in display form.
/// Leading markers on the prematch and trailing markers on the postmatch
/// are trimmed.
fn match_strings(
    words: &[String],
    window_ids: &[u32],
    slide_length: usize,
    window_length: usize,
) -> MatchStrings {
    let first = window_ids.iter().min().copied().unwrap_or(0) as usize;
    let last = window_ids.iter().max().copied().unwrap_or(0) as usize;
    let start = (first * slide_length).min(words.len());
    let end = (last * slide_length + window_length).min(words.len());
    let pre_start = start.saturating_sub(window_length);
    let post_end = (end + window_length).min(words.len());

    let mut prematch = words[pre_start..start].join(" ");
    while let Some(rest) = prematch.strip_prefix("<br/>") {
        prematch = rest.to_string();
    }
    let mut postmatch = words[end..post_end].join(" ");
    while let Some(rest) = postmatch.strip_suffix("<br/>") {
        postmatch = rest.to_string();
    }
    MatchStrings {
        prematch,
        matched: words[start..end].join(" "),
        postmatch,
    }
}

/// Resolve the viewer URL for a cluster, substituting the page id of its
/// first window when page mapping is active.
fn page_url(
    url: &str,
    pages: &HashMap<u32, String>,
    window_ids: &[u32],
    cfg: &RunConfig,
) -> String {
    if cfg.xml_page_tag.is_none() {
        return url.to_string();
    }
    let page = window_ids
        .first()
        .and_then(|w| pages.get(w))
        .map(String::as_str)
        .unwrap_or("");
    url.replace("$PAGE_ID", page)
}

/// Merge the per-pair files into one JSON file per document, renumber the
/// record ids densely, then derive the sort indices and scatterplots.
pub fn create_all_match_json(
    output: &Path,
    compute_probabilities: bool,
) -> Result<(), PipelineError> {
    info!("formatting JSON outputs");
    let matches_root = output.join("api").join("matches");
    let mut directories: Vec<PathBuf> = read_dir_sorted(&matches_root)?
        .into_iter()
        .filter(|p| p.is_dir())
        .collect();
    directories.sort_by_key(|p| dir_doc_id(p));

    // The same UUID appears under both of its documents; first-seen order
    // assigns it one dense id shared by both copies.
    let mut dense_ids: HashMap<String, u64> = HashMap::new();
    for directory in &directories {
        let mut merged: Vec<MatchRecord> = Vec::new();
        for file in read_dir_sorted(directory)? {
            if file.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&file).map_err(|source| PipelineError::Output {
                path: file.clone(),
                source,
            })?;
            let records: Vec<MatchRecord> = serde_json::from_str(&content)?;
            for mut record in records {
                let uuid = record.id.as_str().unwrap_or_default().to_string();
                let next = dense_ids.len() as u64;
                let id = *dense_ids.entry(uuid).or_insert(next);
                record.id = json!(id);
                merged.push(record);
            }
        }
        let target = directory.with_extension("json");
        write_json_atomic(&target, &merged)?;
        fs::remove_dir_all(directory).map_err(|source| PipelineError::Output {
            path: directory.clone(),
            source,
        })?;
    }

    write_indices(output, compute_probabilities)?;
    write_scatterplots(output)?;
    Ok(())
}

fn dir_doc_id(path: &Path) -> u64 {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}

/// Minimal tuple view of one match used by the sort indices.
#[derive(Clone, PartialEq)]
struct IndexEntry {
    match_idx: u64,
    source_file_id: u64,
    target_file_id: u64,
    length: u64,
    probability: f64,
    similarity: u64,
    author: String,
    title: String,
    year: String,
}

fn write_indices(output: &Path, compute_probabilities: bool) -> Result<(), PipelineError> {
    let mut entries: Vec<IndexEntry> = Vec::new();
    for (doc_id, matches) in stream_match_lists(output)? {
        for (match_idx, record) in matches.iter().enumerate() {
            if record.source_file_id as u64 != doc_id {
                continue;
            }
            entries.push(IndexEntry {
                match_idx: match_idx as u64,
                source_file_id: u64::from(record.source_file_id),
                target_file_id: u64::from(record.target_file_id),
                length: record
                    .source_segment_ids
                    .len()
                    .min(record.target_segment_ids.len()) as u64,
                probability: record.probability,
                similarity: u64::from(record.similarity),
                author: record.source_author.clone(),
                title: record.source_title.clone(),
                year: record.source_year.clone(),
            });
        }
    }
    // Set semantics before sorting.
    entries.sort_by(|a, b| full_key(a).cmp(&full_key(b)));
    entries.dedup_by(|a, b| full_key(a) == full_key(b));

    let headings: &[(&str, bool)] = &[
        ("length", true),
        ("probability", true),
        ("similarity", true),
        ("author", false),
        ("title", false),
        ("year", false),
    ];
    for &(label, descending) in headings {
        if label == "probability" && !compute_probabilities {
            continue;
        }
        let mut sorted = entries.clone();
        sorted.sort_by(|a, b| index_key(a, label).cmp(&index_key(b, label)));
        if descending {
            sorted.reverse();
        }
        let ids: Vec<Value> = sorted
            .iter()
            .map(|e| {
                json!([
                    e.match_idx,
                    e.source_file_id,
                    e.target_file_id,
                    e.length,
                    e.probability,
                    e.similarity
                ])
            })
            .collect();
        let path = output
            .join("api")
            .join("indices")
            .join(format!("match-ids-by-{label}.json"));
        write_json_atomic(&path, &ids)?;
    }
    Ok(())
}

/// Leading component of an index sort key.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum Lead {
    Number(u64),
    Text(String),
}

type SortKey = (Lead, Vec<u64>, String, String, String, u64, u64, u64);

fn full_key(e: &IndexEntry) -> (u64, u64, u64, u64, u64, String, String, String) {
    (
        e.match_idx,
        e.source_file_id,
        e.target_file_id,
        e.length,
        e.probability.to_bits(),
        e.author.clone(),
        e.title.clone(),
        e.year.clone(),
    )
}

/// Sort key for one index heading: the heading's field leads, the other
/// numeric measures and label fields break ties, ending with the ids.
fn index_key(e: &IndexEntry, label: &str) -> SortKey {
    // Probabilities from the counter are finite, so their order-preserving
    // bit image compares like the number itself.
    let prob_bits = probability_order(e.probability);
    let (lead, numbers, strings) = match label {
        "length" => (
            Lead::Number(e.length),
            vec![prob_bits, e.similarity],
            (e.author.clone(), e.title.clone(), e.year.clone()),
        ),
        "probability" => (
            Lead::Number(prob_bits),
            vec![e.length, e.similarity],
            (e.author.clone(), e.title.clone(), e.year.clone()),
        ),
        "similarity" => (
            Lead::Number(e.similarity),
            vec![e.length, prob_bits],
            (e.author.clone(), e.title.clone(), e.year.clone()),
        ),
        "author" => (
            Lead::Text(e.author.clone()),
            vec![e.length, prob_bits, e.similarity],
            (e.title.clone(), e.year.clone(), String::new()),
        ),
        "title" => (
            Lead::Text(e.title.clone()),
            vec![e.length, prob_bits, e.similarity],
            (e.author.clone(), e.year.clone(), String::new()),
        ),
        _ => (
            Lead::Text(e.year.clone()),
            vec![e.length, prob_bits, e.similarity],
            (e.author.clone(), e.title.clone(), String::new()),
        ),
    };
    (
        lead,
        numbers,
        strings.0,
        strings.1,
        strings.2,
        e.source_file_id,
        e.target_file_id,
        e.match_idx,
    )
}

/// Order-preserving u64 image of a finite f64 (sign-magnitude flip).
fn probability_order(p: f64) -> u64 {
    let bits = p.to_bits();
    if p >= 0.0 {
        bits | (1 << 63)
    } else {
        !bits
    }
}

fn stream_match_lists(output: &Path) -> Result<Vec<(u64, Vec<MatchRecord>)>, PipelineError> {
    let matches_root = output.join("api").join("matches");
    let mut lists = Vec::new();
    for file in read_dir_sorted(&matches_root)? {
        if file.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(doc_id) = file
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok())
        else {
            continue;
        };
        let content = fs::read_to_string(&file).map_err(|source| PipelineError::Output {
            path: file.clone(),
            source,
        })?;
        lists.push((doc_id, serde_json::from_str(&content)?));
    }
    lists.sort_by_key(|(id, _)| *id);
    Ok(lists)
}

fn write_scatterplots(output: &Path) -> Result<(), PipelineError> {
    let lists = stream_match_lists(output)?;
    let out_dir = output.join("api").join("scatterplots");
    for side in ["source", "target"] {
        for unit in ["segment_ids", "file_id", "author"] {
            for statistic in ["sum", "mean"] {
                // Group by level key, preserving first-seen order.
                let mut order: Vec<String> = Vec::new();
                let mut grouped: HashMap<String, Vec<&MatchRecord>> = HashMap::new();
                for (_, matches) in &lists {
                    for record in matches {
                        let level = level_key(record, side, unit);
                        if !grouped.contains_key(&level) {
                            order.push(level.clone());
                        }
                        grouped.entry(level).or_default().push(record);
                    }
                }
                let mut data = Vec::with_capacity(order.len());
                for level in order {
                    let records = &grouped[&level];
                    let sims: Vec<f64> =
                        records.iter().map(|r| f64::from(r.similarity)).collect();
                    let similarity = if statistic == "sum" {
                        sims.iter().sum::<f64>()
                    } else {
                        sims.iter().sum::<f64>() / sims.len() as f64
                    };
                    let first = records[0];
                    let (title, author, matched) = if side == "source" {
                        (
                            &first.source_title,
                            &first.source_author,
                            &first.source_match,
                        )
                    } else {
                        (
                            &first.target_title,
                            &first.target_author,
                            &first.target_match,
                        )
                    };
                    data.push(json!({
                        "type": side,
                        "unit": unit,
                        "statistic": statistic,
                        "key": level,
                        "similarity": similarity,
                        "title": title,
                        "author": author,
                        "match": matched,
                        "source_year": first.source_year,
                        "target_year": first.target_year,
                    }));
                }
                let path = out_dir.join(format!("{side}-{unit}-{statistic}.json"));
                write_json_atomic(&path, &data)?;
            }
        }
    }
    Ok(())
}

fn level_key(record: &MatchRecord, side: &str, unit: &str) -> String {
    let (file_id, segments, author) = if side == "source" {
        (
            record.source_file_id,
            &record.source_segment_ids,
            &record.source_author,
        )
    } else {
        (
            record.target_file_id,
            &record.target_segment_ids,
            &record.target_author,
        )
    };
    match unit {
        "segment_ids" => {
            let joined = segments
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(".");
            format!("{side}.{file_id}.{joined}")
        }
        "file_id" => file_id.to_string(),
        _ => author.clone(),
    }
}

/// Write the display word list for every document.
pub fn write_texts(ctx: &ReportContext<'_>) -> Result<(), PipelineError> {
    info!("preparing text reader data");
    let texts_dir = ctx.cfg.output.join("api").join("texts");
    for doc in ctx.corpus.documents() {
        let words = match ctx.texts.display_words(&doc.path) {
            Ok(words) => words,
            Err(err) => {
                warn!(doc = doc.id, error = %err, "skipping reader data for unreadable document");
                continue;
            }
        };
        let path = texts_dir.join(format!("{}.json", doc.id));
        write_json_atomic(&path, &*words)?;
    }
    Ok(())
}

/// Write the run summary the viewer bootstraps from.
pub fn write_run_config(ctx: &ReportContext<'_>) -> Result<(), PipelineError> {
    info!("writing config");
    let mut metadata = Vec::new();
    for doc in ctx.corpus.documents() {
        if matches!(doc.role, Role::Excluded | Role::Banished) {
            continue;
        }
        let merged = ctx
            .cfg
            .output
            .join("api")
            .join("matches")
            .join(format!("{}.json", doc.id));
        let has_matches = fs::metadata(&merged).map(|m| m.len() > 2).unwrap_or(false);
        let meta = ctx.corpus.meta(doc.id);
        metadata.push(json!({
            "id": doc.id,
            "author": meta.author(),
            "title": meta.title(),
            "matches": has_matches,
        }));
    }
    let config = json!({
        "infiles": ctx
            .corpus
            .documents()
            .iter()
            .map(|d| d.path.to_string_lossy())
            .collect::<Vec<_>>(),
        "metadata": metadata,
        "window_size": ctx.cfg.window_length,
        "window_slide": ctx.cfg.slide_length,
    });
    let path = ctx.cfg.output.join("api").join("config.json");
    write_json_atomic(&path, &config)
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = fs::read_dir(dir).map_err(|source| PipelineError::Output {
        path: dir.to_owned(),
        source,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| PipelineError::Output {
            path: dir.to_owned(),
            source,
        })?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

/// Temp-then-rename write so readers never observe partial files.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let data = serde_json::to_vec(value)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data).map_err(|source| PipelineError::Output {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| PipelineError::Output {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn match_strings_cover_window_span() {
        // W=4, S=2; windows 1..=2 cover words 2..=11.
        let words: Vec<String> = (0..20).map(|i| format!("w{i}")).collect();
        let strings = match_strings(&words, &[1, 2], 2, 4);
        assert_eq!(strings.matched, "w2 w3 w4 w5 w6 w7");
        assert_eq!(strings.prematch, "w0 w1");
        assert_eq!(strings.postmatch, "w8 w9 w10 w11");
    }

    #[test]
    fn match_strings_clamp_at_document_edges() {
        let words = display(&["a", "b", "c"]);
        let strings = match_strings(&words, &[0], 2, 4);
        assert_eq!(strings.prematch, "");
        assert_eq!(strings.matched, "a b c");
        assert_eq!(strings.postmatch, "");
    }

    #[test]
    fn match_strings_trim_break_markers() {
        let words = display(&["<br/>", "mid", "tail<br/>"]);
        // Window 1 of W=1, S=1 selects "mid"; the adjacent contexts carry
        // break markers that must be trimmed off.
        let strings = match_strings(&words, &[1], 1, 1);
        assert_eq!(strings.matched, "mid");
        assert_eq!(strings.prematch, "");
        assert_eq!(strings.postmatch, "tail");
    }

    #[test]
    fn page_url_substitutes_first_window_page() {
        let cfg = RunConfig {
            xml_page_tag: Some("pb".into()),
            ..Default::default()
        };
        let pages = HashMap::from([(3u32, "xii".to_string())]);
        assert_eq!(
            page_url("http://x/p/$PAGE_ID", &pages, &[3, 4], &cfg),
            "http://x/p/xii"
        );
        assert_eq!(
            page_url("http://x/p/$PAGE_ID", &pages, &[9], &cfg),
            "http://x/p/"
        );
    }

    #[test]
    fn page_url_passthrough_without_page_tag() {
        let cfg = RunConfig::default();
        assert_eq!(
            page_url("http://x/$PAGE_ID", &HashMap::new(), &[0], &cfg),
            "http://x/$PAGE_ID"
        );
    }

    #[test]
    fn probability_order_preserves_ordering() {
        let values = [-1.0f64, 0.0, 0.5, 12.0, 1500.0];
        for pair in values.windows(2) {
            assert!(probability_order(pair[0]) < probability_order(pair[1]));
        }
    }

    #[test]
    fn index_sorting_descends_on_similarity() {
        let base = IndexEntry {
            match_idx: 0,
            source_file_id: 0,
            target_file_id: 1,
            length: 2,
            probability: -1.0,
            similarity: 60,
            author: "a".into(),
            title: "t".into(),
            year: "1900".into(),
        };
        let better = IndexEntry {
            similarity: 90,
            ..base.clone()
        };
        let mut entries = vec![base.clone(), better.clone()];
        entries.sort_by(|a, b| index_key(a, "similarity").cmp(&index_key(b, "similarity")));
        entries.reverse();
        assert_eq!(entries[0].similarity, 90);
    }
}
