//! The document table for a run.
//!
//! Document ids are dense integers fixed by the canonical (sorted) input
//! order and never change after startup. Roles are assigned once from the
//! CLI globs; the pipeline only ever consults them through [`Corpus`].

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde_json::Value;

/// How a document participates in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Matched and exported normally.
    Normal,
    /// Matched, but its pairs are dropped at export time.
    Excluded,
    /// Matches reachable from this document's windows are deleted.
    Banished,
    /// Focal mode: only pairs touching this document are kept.
    Focal,
}

/// One input document.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: u32,
    pub path: PathBuf,
    pub role: Role,
}

/// Per-file viewer metadata, keyed by file basename in the input JSON.
///
/// Unknown keys are preserved so the loader stays forward compatible with
/// whatever the metadata file carries (`image`, `url`, ...).
#[derive(Debug, Clone, Default)]
pub struct FileMeta {
    fields: serde_json::Map<String, Value>,
}

impl FileMeta {
    pub fn from_fields(fields: serde_json::Map<String, Value>) -> Self {
        Self { fields }
    }

    fn str_field(&self, key: &str) -> &str {
        self.fields.get(key).and_then(Value::as_str).unwrap_or("")
    }

    pub fn author(&self) -> &str {
        self.str_field("author")
    }

    pub fn title(&self) -> &str {
        self.str_field("title")
    }

    pub fn url(&self) -> &str {
        self.str_field("url")
    }

    /// Year rendered for display; empty when absent.
    pub fn year_display(&self) -> String {
        match self.fields.get("year") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Year as an orderable number, when the metadata carries one.
    pub fn year_ord(&self) -> Option<i64> {
        match self.fields.get("year")? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// The full document set plus its metadata.
#[derive(Debug, Clone)]
pub struct Corpus {
    documents: Vec<Document>,
    metadata: HashMap<String, FileMeta>,
}

impl Corpus {
    /// Assemble the corpus from resolved file lists.
    ///
    /// `infiles` must already be in canonical order (ids are assigned by
    /// position). Banished and excluded sets are indices into `infiles`.
    pub fn new(
        infiles: Vec<PathBuf>,
        banished_ids: &BTreeSet<u32>,
        excluded_ids: &BTreeSet<u32>,
        focal_id: Option<u32>,
        raw_metadata: serde_json::Map<String, Value>,
    ) -> Self {
        let documents = infiles
            .into_iter()
            .enumerate()
            .map(|(idx, path)| {
                let id = idx as u32;
                let role = if banished_ids.contains(&id) {
                    Role::Banished
                } else if excluded_ids.contains(&id) {
                    Role::Excluded
                } else if focal_id == Some(id) {
                    Role::Focal
                } else {
                    Role::Normal
                };
                Document { id, path, role }
            })
            .collect::<Vec<_>>();

        let mut metadata: HashMap<String, FileMeta> = raw_metadata
            .into_iter()
            .filter_map(|(name, value)| match value {
                Value::Object(fields) => Some((name, FileMeta::from_fields(fields))),
                _ => None,
            })
            .collect();

        // Every document gets an entry; fill author/title defaults and trim
        // stray whitespace from provided string values.
        for doc in &documents {
            let basename = basename_of(&doc.path);
            let entry = metadata.entry(basename.clone()).or_default();
            for value in entry.fields.values_mut() {
                if let Value::String(s) = value {
                    *s = s.trim().to_string();
                }
            }
            if entry.author().is_empty() {
                entry
                    .fields
                    .insert("author".into(), Value::String("Unknown".into()));
            }
            if entry.title().is_empty() {
                entry.fields.insert("title".into(), Value::String(basename));
            }
        }

        Self {
            documents,
            metadata,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn path(&self, id: u32) -> &Path {
        &self.documents[id as usize].path
    }

    pub fn role(&self, id: u32) -> Role {
        self.documents[id as usize].role
    }

    pub fn basename(&self, id: u32) -> String {
        basename_of(self.path(id))
    }

    pub fn meta(&self, id: u32) -> &FileMeta {
        static EMPTY: std::sync::OnceLock<FileMeta> = std::sync::OnceLock::new();
        self.metadata
            .get(&self.basename(id))
            .unwrap_or_else(|| EMPTY.get_or_init(FileMeta::default))
    }

    pub fn banished_ids(&self) -> BTreeSet<u32> {
        self.role_ids(Role::Banished)
    }

    pub fn excluded_ids(&self) -> BTreeSet<u32> {
        self.role_ids(Role::Excluded)
    }

    pub fn focal_id(&self) -> Option<u32> {
        self.documents
            .iter()
            .find(|d| d.role == Role::Focal)
            .map(|d| d.id)
    }

    fn role_ids(&self, role: Role) -> BTreeSet<u32> {
        self.documents
            .iter()
            .filter(|d| d.role == role)
            .map(|d| d.id)
            .collect()
    }
}

fn basename_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus_with_meta(meta: &str) -> Corpus {
        let raw = serde_json::from_str::<Value>(meta)
            .unwrap()
            .as_object()
            .cloned()
            .unwrap();
        Corpus::new(
            vec![PathBuf::from("texts/a.txt"), PathBuf::from("texts/b.txt")],
            &BTreeSet::new(),
            &BTreeSet::new(),
            None,
            raw,
        )
    }

    #[test]
    fn ids_follow_input_order() {
        let corpus = corpus_with_meta("{}");
        assert_eq!(corpus.documents()[0].id, 0);
        assert_eq!(corpus.documents()[1].id, 1);
        assert_eq!(corpus.basename(1), "b.txt");
    }

    #[test]
    fn metadata_defaults_filled() {
        let corpus = corpus_with_meta(r#"{"a.txt": {"author": "  Someone  "}}"#);
        assert_eq!(corpus.meta(0).author(), "Someone");
        assert_eq!(corpus.meta(0).title(), "a.txt");
        assert_eq!(corpus.meta(1).author(), "Unknown");
    }

    #[test]
    fn year_parsing_accepts_numbers_and_strings() {
        let corpus = corpus_with_meta(r#"{"a.txt": {"year": 1854}, "b.txt": {"year": "1855"}}"#);
        assert_eq!(corpus.meta(0).year_ord(), Some(1854));
        assert_eq!(corpus.meta(1).year_ord(), Some(1855));
        assert_eq!(corpus.meta(0).year_display(), "1854");
        assert_eq!(corpus.meta(1).year_display(), "1855");
    }

    #[test]
    fn roles_assigned_once() {
        let corpus = Corpus::new(
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("b.txt"),
                PathBuf::from("c.txt"),
            ],
            &BTreeSet::from([2u32]),
            &BTreeSet::from([1u32]),
            None,
            serde_json::Map::new(),
        );
        assert_eq!(corpus.role(0), Role::Normal);
        assert_eq!(corpus.role(1), Role::Excluded);
        assert_eq!(corpus.role(2), Role::Banished);
        assert_eq!(corpus.banished_ids(), BTreeSet::from([2u32]));
    }
}
