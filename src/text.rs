//! Deterministic word extraction and windowing.
//!
//! Everything downstream of this module sees documents only as ordered word
//! lists: the fingerprinter consumes space-joined windows of
//! `window_length` words sliding by `slide_length`, and the reporter
//! consumes a display variant that preserves line breaks as `<br/>`
//! markers. Both variants are pure functions of the file bytes and the
//! normalization options, which is what makes the signature cache safe to
//! share across runs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::config::RunConfig;
use crate::error::TextError;

/// Normalization options applied before tokenization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextOptions {
    pub xml_base_tag: Option<String>,
    pub xml_remove_tags: Vec<String>,
    pub strip_diacritics: bool,
}

impl TextOptions {
    pub fn from_config(cfg: &RunConfig) -> Self {
        Self {
            xml_base_tag: cfg.xml_base_tag.clone(),
            xml_remove_tags: cfg.xml_remove_tags.clone(),
            strip_diacritics: cfg.strip_diacritics,
        }
    }
}

/// Read a document and return its match-side word list.
pub fn words(path: &Path, opts: &TextOptions) -> Result<Vec<String>, TextError> {
    let text = read_text(path, opts)?;
    let text = if opts.strip_diacritics {
        fold_diacritics(&text)
    } else {
        text
    };
    Ok(text.split_whitespace().map(str::to_owned).collect())
}

/// Read a document and return its display word list.
///
/// Line breaks become `<br/>` suffixes on the preceding word, capped at two
/// consecutive markers. Diacritics are never stripped here so the viewer
/// shows the original text.
pub fn display_words(path: &Path, opts: &TextOptions) -> Result<Vec<String>, TextError> {
    let text = read_text(path, opts)?;
    let marked = text.replace('\n', " __NEWLINE__ ");
    let mut formatted: Vec<String> = Vec::new();
    for token in marked.split_whitespace() {
        if token == "__NEWLINE__" {
            if let Some(last) = formatted.last_mut() {
                if !last.ends_with("<br/><br/>") {
                    last.push_str("<br/>");
                }
            }
        } else {
            formatted.push(token.to_owned());
        }
    }
    Ok(formatted)
}

/// Slide a window of `window_length` words by `slide_length` and join each
/// slice with single spaces. Short tails are discarded: the sequence has
/// exactly `max(0, (n - W) / S + 1)` entries.
pub fn windows(words: &[String], window_length: usize, slide_length: usize) -> Vec<String> {
    let slide = slide_length.max(1);
    if window_length == 0 || words.len() < window_length {
        return Vec::new();
    }
    let mut out = Vec::with_capacity((words.len() - window_length) / slide + 1);
    let mut start = 0;
    while start + window_length <= words.len() {
        out.push(words[start..start + window_length].join(" "));
        start += slide;
    }
    out
}

fn read_text(path: &Path, opts: &TextOptions) -> Result<String, TextError> {
    let raw = fs::read_to_string(path).map_err(|source| TextError::Read {
        path: path.to_owned(),
        source,
    })?;
    match &opts.xml_base_tag {
        Some(tag) => Ok(extract_tag_text(&raw, tag, &opts.xml_remove_tags, path)),
        None => Ok(raw),
    }
}

/// Collect the text content of the first `base_tag` element, dropping the
/// subtrees of any `remove_tags`. A missing base tag yields an empty
/// document, which contributes nothing downstream.
fn extract_tag_text(raw: &str, base_tag: &str, remove_tags: &[String], path: &Path) -> String {
    let base = base_tag.to_ascii_lowercase();
    let removable: Vec<String> = remove_tags
        .iter()
        .map(|t| t.to_ascii_lowercase())
        .collect();

    let mut reader = Reader::from_str(raw);
    let mut out = String::new();
    let mut base_depth = 0usize;
    let mut skip_depth = 0usize;
    let mut seen_base = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                if skip_depth > 0 {
                    skip_depth += 1;
                } else if base_depth > 0 {
                    if removable.contains(&name) {
                        skip_depth = 1;
                    } else {
                        base_depth += 1;
                    }
                } else if !seen_base && name == base {
                    seen_base = true;
                    base_depth = 1;
                }
            }
            Ok(Event::End(_)) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                } else if base_depth > 0 {
                    base_depth -= 1;
                    if base_depth == 0 {
                        break;
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if base_depth > 0 && skip_depth == 0 {
                    match e.unescape() {
                        Ok(text) => out.push_str(&text),
                        Err(_) => out.push_str(&String::from_utf8_lossy(e.as_ref())),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                // Lightly tagged inputs are often not well formed; keep what
                // was extracted so far rather than failing the document.
                warn!(path = %path.display(), error = %err, "xml parse error during extraction");
                break;
            }
            Ok(_) => {}
        }
    }

    if !seen_base {
        warn!(path = %path.display(), tag = %base, "no xml content found at base tag");
    }
    out
}

/// NFKD-style fold: decompose and drop combining marks so accented
/// characters collapse to their base letters.
pub fn fold_diacritics(text: &str) -> String {
    text.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Map window ids to page identifiers by treating `page_tag` as a page
/// delimiter. The identifier comes from `page_attr` when configured, from
/// the tag's inner text when present, and falls back to the page ordinal.
pub fn window_page_map(
    path: &Path,
    page_tag: &str,
    page_attr: Option<&str>,
    slide_length: usize,
) -> Result<HashMap<u32, String>, TextError> {
    let raw = fs::read_to_string(path).map_err(|source| TextError::Read {
        path: path.to_owned(),
        source,
    })?;
    let content = raw.to_lowercase();
    let tag = page_tag.to_lowercase();
    let attr = page_attr.map(str::to_lowercase);

    // Split on opening page tags. NUL bytes cannot occur in the text, so the
    // marker never collides with document content.
    // Self-closing and bare forms keep a `>` so the body split below still
    // finds the end of the opening tag.
    let marker = "\u{0}page\u{0}break\u{0}";
    let content = content
        .replace(&format!("<{tag} "), marker)
        .replace(&format!("<{tag}/>"), &format!("{marker}>"))
        .replace(&format!("<{tag}>"), &format!("{marker}>"));
    let pages: Vec<&str> = content.split(marker).collect();

    let mut map = HashMap::new();
    let mut window_id: u32 = 0;
    // Content before the first page tag belongs to no page.
    for (page_index, page) in pages.iter().skip(1).enumerate() {
        let page_id = page_identifier(page, &tag, attr.as_deref(), page_index);
        // Drop the remainder of the opening tag before counting words.
        let body = page.split_once('>').map(|(_, rest)| rest).unwrap_or("");
        let text = strip_tags(body);
        for (word_index, _) in text.split_whitespace().enumerate() {
            if word_index > 0 && word_index % slide_length.max(1) == 0 {
                window_id += 1;
            }
            map.insert(window_id, page_id.clone());
        }
    }
    Ok(map)
}

fn page_identifier(page: &str, tag: &str, attr: Option<&str>, page_index: usize) -> String {
    if let Some(attr) = attr {
        let head = page.split('>').next().unwrap_or("");
        if let Some(rest) = head.split(&format!("{attr}=")).nth(1) {
            let value = rest.split(' ').next().unwrap_or("");
            let value = value.replace(|c| c == '"' || c == '\'', "");
            return value
                .trim_end_matches(|c| c == '/' || c == '>')
                .trim()
                .to_string();
        }
    }
    let close = format!("</{tag}");
    if let Some(before_close) = page.split(&close).next() {
        if page.contains(&close) {
            let inner = match before_close.split_once('>') {
                Some((_, rest)) => rest,
                None => before_close,
            };
            return inner.trim().to_string();
        }
    }
    page_index.to_string()
}

/// Remove markup spans without interpreting them.
fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Shared read-mostly cache for word lists and windows.
///
/// Entries are produced once per run and shared across the worker pools;
/// after first write a slot is never mutated again.
pub struct TextCache {
    opts: TextOptions,
    window_length: usize,
    slide_length: usize,
    page_tag: Option<String>,
    page_attr: Option<String>,
    words: RwLock<HashMap<PathBuf, Arc<Vec<String>>>>,
    display: RwLock<HashMap<PathBuf, Arc<Vec<String>>>>,
    windows: RwLock<HashMap<PathBuf, Arc<Vec<String>>>>,
    page_maps: RwLock<HashMap<PathBuf, Arc<HashMap<u32, String>>>>,
}

impl TextCache {
    pub fn new(cfg: &RunConfig) -> Self {
        Self {
            opts: TextOptions::from_config(cfg),
            window_length: cfg.window_length,
            slide_length: cfg.slide_length,
            page_tag: cfg.xml_page_tag.clone(),
            page_attr: cfg.xml_page_attr.clone(),
            words: RwLock::new(HashMap::new()),
            display: RwLock::new(HashMap::new()),
            windows: RwLock::new(HashMap::new()),
            page_maps: RwLock::new(HashMap::new()),
        }
    }

    pub fn words(&self, path: &Path) -> Result<Arc<Vec<String>>, TextError> {
        if let Some(hit) = self.words.read().expect("words cache poisoned").get(path) {
            return Ok(Arc::clone(hit));
        }
        let computed = Arc::new(words(path, &self.opts)?);
        let mut guard = self.words.write().expect("words cache poisoned");
        Ok(Arc::clone(
            guard
                .entry(path.to_owned())
                .or_insert_with(|| Arc::clone(&computed)),
        ))
    }

    pub fn display_words(&self, path: &Path) -> Result<Arc<Vec<String>>, TextError> {
        if let Some(hit) = self
            .display
            .read()
            .expect("display cache poisoned")
            .get(path)
        {
            return Ok(Arc::clone(hit));
        }
        let computed = Arc::new(display_words(path, &self.opts)?);
        let mut guard = self.display.write().expect("display cache poisoned");
        Ok(Arc::clone(
            guard
                .entry(path.to_owned())
                .or_insert_with(|| Arc::clone(&computed)),
        ))
    }

    pub fn windows(&self, path: &Path) -> Result<Arc<Vec<String>>, TextError> {
        if let Some(hit) = self
            .windows
            .read()
            .expect("windows cache poisoned")
            .get(path)
        {
            return Ok(Arc::clone(hit));
        }
        let word_list = self.words(path)?;
        let computed = Arc::new(windows(&word_list, self.window_length, self.slide_length));
        let mut guard = self.windows.write().expect("windows cache poisoned");
        Ok(Arc::clone(
            guard
                .entry(path.to_owned())
                .or_insert_with(|| Arc::clone(&computed)),
        ))
    }

    /// Window→page mapping for a document; empty when no page tag is
    /// configured.
    pub fn page_map(&self, path: &Path) -> Result<Arc<HashMap<u32, String>>, TextError> {
        let Some(tag) = &self.page_tag else {
            return Ok(Arc::new(HashMap::new()));
        };
        if let Some(hit) = self
            .page_maps
            .read()
            .expect("page map cache poisoned")
            .get(path)
        {
            return Ok(Arc::clone(hit));
        }
        let computed = Arc::new(window_page_map(
            path,
            tag,
            self.page_attr.as_deref(),
            self.slide_length,
        )?);
        let mut guard = self.page_maps.write().expect("page map cache poisoned");
        Ok(Arc::clone(
            guard
                .entry(path.to_owned())
                .or_insert_with(|| Arc::clone(&computed)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tmp_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn owned(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn window_count_matches_formula() {
        // n=10, W=4, S=2 -> (10-4)/2 + 1 = 4 windows
        let words = owned(&["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"]);
        let wins = windows(&words, 4, 2);
        assert_eq!(wins.len(), 4);
        assert_eq!(wins[0], "a b c d");
        assert_eq!(wins[1], "c d e f");
        assert_eq!(wins[3], "g h i j");
    }

    #[test]
    fn short_documents_produce_no_windows() {
        let words = owned(&["a", "b"]);
        assert!(windows(&words, 3, 1).is_empty());
        assert!(windows(&[], 3, 1).is_empty());
    }

    #[test]
    fn window_contains_exact_slice() {
        let words: Vec<String> = (0..20).map(|i| format!("w{i}")).collect();
        let wins = windows(&words, 5, 3);
        for (idx, win) in wins.iter().enumerate() {
            let expect = words[idx * 3..idx * 3 + 5].join(" ");
            assert_eq!(*win, expect);
        }
    }

    #[test]
    fn display_words_fold_newlines_into_br() {
        let f = tmp_file("one two\nthree\n\n\nfour");
        let out = display_words(f.path(), &TextOptions::default()).unwrap();
        assert_eq!(out, vec!["one", "two<br/>", "three<br/><br/>", "four"]);
    }

    #[test]
    fn diacritics_fold_to_base_letters() {
        assert_eq!(fold_diacritics("café naïve"), "cafe naive");
        let f = tmp_file("r\u{00E9}sum\u{00E9} text");
        let opts = TextOptions {
            strip_diacritics: true,
            ..Default::default()
        };
        assert_eq!(words(f.path(), &opts).unwrap()[0], "resume");
    }

    #[test]
    fn xml_base_tag_limits_extraction() {
        let f = tmp_file("<doc><head>skip me</head><body>keep <note>drop</note>these words</body></doc>");
        let opts = TextOptions {
            xml_base_tag: Some("body".into()),
            xml_remove_tags: vec!["note".into()],
            ..Default::default()
        };
        let out = words(f.path(), &opts).unwrap();
        assert_eq!(out, owned(&["keep", "these", "words"]));
    }

    #[test]
    fn missing_base_tag_yields_empty_document() {
        let f = tmp_file("<doc>words here</doc>");
        let opts = TextOptions {
            xml_base_tag: Some("body".into()),
            ..Default::default()
        };
        assert!(words(f.path(), &opts).unwrap().is_empty());
    }

    #[test]
    fn page_map_reads_attribute_ids() {
        let f = tmp_file("intro <pb n=\"iv\"/> one two three four <pb n=\"v\"/> five six");
        let map = window_page_map(f.path(), "pb", Some("n"), 2).unwrap();
        assert_eq!(map.get(&0), Some(&"iv".to_string()));
        // The window straddling the page break is attributed to the later page.
        assert_eq!(map.get(&1), Some(&"v".to_string()));
    }

    #[test]
    fn page_map_falls_back_to_ordinals() {
        let f = tmp_file("lead <page/> a b c d <page/> e f g h");
        let map = window_page_map(f.path(), "page", None, 2).unwrap();
        assert_eq!(map.get(&0), Some(&"0".to_string()));
        assert_eq!(map.get(&1), Some(&"1".to_string()));
        assert_eq!(map.get(&2), Some(&"1".to_string()));
    }

    #[test]
    fn cache_returns_shared_entries() {
        let f = tmp_file("a b c d e f g h");
        let cfg = RunConfig {
            window_length: 4,
            slide_length: 2,
            ..Default::default()
        };
        let cache = TextCache::new(&cfg);
        let first = cache.windows(f.path()).unwrap();
        let second = cache.windows(f.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 3);
    }
}
