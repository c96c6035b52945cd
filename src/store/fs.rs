//! Append-only file-tree backend.
//!
//! Hashbands are sharded by the leading characters of the band key into
//! `db/hashbands/<first2>/<next2>`; candidates and matches are keyed by
//! document pair under `db/candidates/<a>/<b>` and `db/matches/<a>/<b>`.
//! Streams rebuild grouping and ordering by reading whole shard files and
//! sorting in memory, which stays cheap because a band never spans shards.
//! Set semantics on the Candidate relation is enforced by the generator,
//! not here.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::StoreError;
use crate::store::{CandidateRow, HashbandRow, MatchRow, Store};

pub struct FileStore {
    root: PathBuf,
    /// Serializes append commits across worker threads.
    write_lock: Mutex<()>,
}

const ROW_DELIMITER: char = '\n';
const FIELD_DELIMITER: char = '-';

impl FileStore {
    /// Open (and optionally re-create) the tree at `<cache_dir>/db`.
    pub fn open(cache_dir: &Path, initialize: bool) -> Result<Self, StoreError> {
        let root = cache_dir.join("db");
        if initialize && root.exists() {
            fs::remove_dir_all(&root).map_err(|source| StoreError::Io {
                path: root.clone(),
                source,
            })?;
        }
        for relation in ["hashbands", "candidates", "matches"] {
            let dir = root.join(relation);
            fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn append(&self, path: &Path, content: &str) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_owned(),
                source,
            })?;
        }
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(|source| StoreError::Io {
                path: path.to_owned(),
                source,
            })?;
        file.write_all(content.as_bytes())
            .map_err(|source| StoreError::Io {
                path: path.to_owned(),
                source,
            })
    }

    /// Shard a band key by its first characters. Band keys are ASCII
    /// (digits and dots) so byte slicing is character safe.
    fn hashband_path(&self, band: &str) -> PathBuf {
        let bytes = band.as_bytes();
        let first = &band[..bytes.len().min(2)];
        let second = if bytes.len() > 2 {
            &band[2..bytes.len().min(4)]
        } else {
            "__"
        };
        self.root.join("hashbands").join(first).join(second)
    }

    fn read_lines(path: &Path) -> Result<Vec<String>, StoreError> {
        let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_owned(),
            source,
        })?;
        Ok(content
            .split(ROW_DELIMITER)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }

    /// Sorted directory entries whose names parse as document ids.
    fn numeric_entries(dir: &Path) -> Result<Vec<(u32, PathBuf)>, StoreError> {
        let mut out = Vec::new();
        let entries = fs::read_dir(dir).map_err(|source| StoreError::Io {
            path: dir.to_owned(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: dir.to_owned(),
                source,
            })?;
            if let Ok(id) = entry.file_name().to_string_lossy().parse::<u32>() {
                out.push((id, entry.path()));
            }
        }
        out.sort_by_key(|(id, _)| *id);
        Ok(out)
    }

    fn pair_files(&self, relation: &str) -> Result<Vec<(u32, u32, PathBuf)>, StoreError> {
        let mut out = Vec::new();
        for (doc_a, dir) in Self::numeric_entries(&self.root.join(relation))? {
            for (doc_b, path) in Self::numeric_entries(&dir)? {
                out.push((doc_a, doc_b, path));
            }
        }
        out.sort_by_key(|(a, b, _)| (*a, *b));
        Ok(out)
    }
}

fn parse_field(field: &str, row: &str, path: &Path) -> Result<u32, StoreError> {
    field.parse().map_err(|_| StoreError::MalformedRow {
        row: row.to_owned(),
        path: path.to_owned(),
    })
}

impl Store for FileStore {
    fn write_hashbands(&self, rows: &[HashbandRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        debug!(count = rows.len(), "writing hashbands");
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        // Group by shard file so each file is opened once per batch.
        let mut by_path: BTreeMap<PathBuf, String> = BTreeMap::new();
        for row in rows {
            let line = format!(
                "{}{FIELD_DELIMITER}{}{FIELD_DELIMITER}{}{ROW_DELIMITER}",
                row.band, row.doc_id, row.window_id
            );
            by_path.entry(self.hashband_path(&row.band)).or_default().push_str(&line);
        }
        for (path, content) in by_path {
            self.append(&path, &content)?;
        }
        Ok(())
    }

    fn write_candidates(&self, rows: &[CandidateRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        debug!(count = rows.len(), "writing candidates");
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut by_path: BTreeMap<PathBuf, String> = BTreeMap::new();
        for row in rows {
            let path = self
                .root
                .join("candidates")
                .join(row.doc_a.to_string())
                .join(row.doc_b.to_string());
            let line = format!(
                "{}{FIELD_DELIMITER}{}{ROW_DELIMITER}",
                row.window_a, row.window_b
            );
            by_path.entry(path).or_default().push_str(&line);
        }
        for (path, content) in by_path {
            self.append(&path, &content)?;
        }
        Ok(())
    }

    fn write_matches(&self, rows: &[MatchRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        debug!(count = rows.len(), "writing matches");
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut by_path: BTreeMap<PathBuf, String> = BTreeMap::new();
        for row in rows {
            let path = self
                .root
                .join("matches")
                .join(row.doc_a.to_string())
                .join(row.doc_b.to_string());
            let line = format!(
                "{}{FIELD_DELIMITER}{}{FIELD_DELIMITER}{}{ROW_DELIMITER}",
                row.window_a, row.window_b, row.similarity
            );
            by_path.entry(path).or_default().push_str(&line);
        }
        for (path, content) in by_path {
            self.append(&path, &content)?;
        }
        Ok(())
    }

    fn scan_hashbands(
        &self,
        visitor: &mut dyn FnMut(HashbandRow) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let hashband_root = self.root.join("hashbands");
        let mut shard_files = Vec::new();
        let shards = fs::read_dir(&hashband_root).map_err(|source| StoreError::Io {
            path: hashband_root.clone(),
            source,
        })?;
        for shard in shards {
            let shard = shard.map_err(|source| StoreError::Io {
                path: hashband_root.clone(),
                source,
            })?;
            let files = fs::read_dir(shard.path()).map_err(|source| StoreError::Io {
                path: shard.path(),
                source,
            })?;
            for file in files {
                let file = file.map_err(|source| StoreError::Io {
                    path: shard.path(),
                    source,
                })?;
                shard_files.push(file.path());
            }
        }
        shard_files.sort();

        for path in shard_files {
            // A band never spans shard files, so per-file grouping is global
            // grouping.
            let mut grouped: BTreeMap<String, Vec<(u32, u32)>> = BTreeMap::new();
            for line in Self::read_lines(&path)? {
                let mut fields = line.rsplitn(3, FIELD_DELIMITER);
                let window = fields.next().unwrap_or("");
                let doc = fields.next().unwrap_or("");
                let band = fields.next().unwrap_or("");
                if band.is_empty() {
                    return Err(StoreError::MalformedRow {
                        row: line.clone(),
                        path: path.clone(),
                    });
                }
                let doc_id = parse_field(doc, &line, &path)?;
                let window_id = parse_field(window, &line, &path)?;
                grouped.entry(band.to_owned()).or_default().push((doc_id, window_id));
            }
            for (band, postings) in grouped {
                let distinct_docs: BTreeSet<u32> = postings.iter().map(|(d, _)| *d).collect();
                if distinct_docs.len() < 2 {
                    continue;
                }
                for (doc_id, window_id) in postings {
                    visitor(HashbandRow {
                        band: band.clone(),
                        doc_id,
                        window_id,
                    })?;
                }
            }
        }
        Ok(())
    }

    fn candidate_pairs(&self) -> Result<Vec<(u32, u32)>, StoreError> {
        Ok(self
            .pair_files("candidates")?
            .into_iter()
            .map(|(a, b, _)| (a, b))
            .collect())
    }

    fn candidate_windows(&self, doc_a: u32, doc_b: u32) -> Result<Vec<(u32, u32)>, StoreError> {
        let path = self
            .root
            .join("candidates")
            .join(doc_a.to_string())
            .join(doc_b.to_string());
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut windows = BTreeSet::new();
        for line in Self::read_lines(&path)? {
            let mut fields = line.split(FIELD_DELIMITER);
            let window_a = parse_field(fields.next().unwrap_or(""), &line, &path)?;
            let window_b = parse_field(fields.next().unwrap_or(""), &line, &path)?;
            windows.insert((window_a, window_b));
        }
        Ok(windows.into_iter().collect())
    }

    fn match_pairs(&self) -> Result<Vec<(u32, u32)>, StoreError> {
        Ok(self
            .pair_files("matches")?
            .into_iter()
            .map(|(a, b, _)| (a, b))
            .collect())
    }

    fn pair_matches(&self, doc_a: u32, doc_b: u32) -> Result<Vec<MatchRow>, StoreError> {
        let path = self
            .root
            .join("matches")
            .join(doc_a.to_string())
            .join(doc_b.to_string());
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut rows = Vec::new();
        for line in Self::read_lines(&path)? {
            let mut fields = line.split(FIELD_DELIMITER);
            let window_a = parse_field(fields.next().unwrap_or(""), &line, &path)?;
            let window_b = parse_field(fields.next().unwrap_or(""), &line, &path)?;
            let similarity = parse_field(fields.next().unwrap_or(""), &line, &path)?;
            rows.push(MatchRow {
                doc_a,
                doc_b,
                window_a,
                window_b,
                similarity,
            });
        }
        Ok(rows)
    }

    fn all_matches(&self) -> Result<Vec<MatchRow>, StoreError> {
        let mut rows = Vec::new();
        for (doc_a, doc_b, _) in self.pair_files("matches")? {
            rows.extend(self.pair_matches(doc_a, doc_b)?);
        }
        Ok(rows)
    }

    fn delete_matches(&self, endpoints: &HashSet<(u32, u32)>) -> Result<(), StoreError> {
        if endpoints.is_empty() {
            return Ok(());
        }
        debug!(count = endpoints.len(), "deleting banished endpoints");
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        for (doc_a, doc_b, path) in self.pair_files("matches")? {
            let mut kept = String::new();
            let mut dropped = false;
            for line in Self::read_lines(&path)? {
                let mut fields = line.split(FIELD_DELIMITER);
                let window_a = parse_field(fields.next().unwrap_or(""), &line, &path)?;
                let window_b = parse_field(fields.next().unwrap_or(""), &line, &path)?;
                if endpoints.contains(&(doc_a, window_a)) || endpoints.contains(&(doc_b, window_b))
                {
                    dropped = true;
                } else {
                    kept.push_str(&line);
                    kept.push(ROW_DELIMITER);
                }
            }
            if !dropped {
                continue;
            }
            if kept.is_empty() {
                fs::remove_file(&path).map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
            } else {
                fs::write(&path, kept).map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), true).unwrap();
        (dir, store)
    }

    #[test]
    fn hashband_scan_filters_single_document_bands() {
        let (_dir, store) = open_store();
        store
            .write_hashbands(&[
                HashbandRow {
                    band: "17.4.9.2".into(),
                    doc_id: 0,
                    window_id: 3,
                },
                HashbandRow {
                    band: "17.4.9.2".into(),
                    doc_id: 2,
                    window_id: 8,
                },
                HashbandRow {
                    band: "17.9.9.9".into(),
                    doc_id: 0,
                    window_id: 1,
                },
            ])
            .unwrap();

        let mut seen = Vec::new();
        store
            .scan_hashbands(&mut |row| {
                seen.push((row.band, row.doc_id, row.window_id));
                Ok(())
            })
            .unwrap();
        assert_eq!(
            seen,
            vec![
                ("17.4.9.2".to_string(), 0, 3),
                ("17.4.9.2".to_string(), 2, 8)
            ]
        );
    }

    #[test]
    fn candidate_files_keyed_by_pair() {
        let (dir, store) = open_store();
        store
            .write_candidates(&[
                CandidateRow {
                    doc_a: 0,
                    doc_b: 2,
                    window_a: 1,
                    window_b: 7,
                },
                CandidateRow {
                    doc_a: 0,
                    doc_b: 1,
                    window_a: 4,
                    window_b: 4,
                },
            ])
            .unwrap();
        assert!(dir.path().join("db/candidates/0/2").exists());
        assert_eq!(store.candidate_pairs().unwrap(), vec![(0, 1), (0, 2)]);
        assert_eq!(store.candidate_windows(0, 2).unwrap(), vec![(1, 7)]);
        assert!(store.candidate_windows(5, 9).unwrap().is_empty());
    }

    #[test]
    fn delete_removes_rows_with_either_endpoint() {
        let (_dir, store) = open_store();
        store
            .write_matches(&[
                MatchRow {
                    doc_a: 0,
                    doc_b: 1,
                    window_a: 0,
                    window_b: 9,
                    similarity: 80,
                },
                MatchRow {
                    doc_a: 0,
                    doc_b: 1,
                    window_a: 1,
                    window_b: 2,
                    similarity: 70,
                },
            ])
            .unwrap();

        // (1, 9) is a B-side endpoint; the file variant must honor it too.
        store
            .delete_matches(&HashSet::from([(1u32, 9u32)]))
            .unwrap();
        let rows = store.all_matches().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].window_a, 1);
    }
}
