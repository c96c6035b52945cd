//! Embedded SQLite backend.
//!
//! Three tables mirror the logical relations. The candidate table carries a
//! UNIQUE index over its 4-tuple so duplicate emissions from different
//! bands fold away inside the engine, and the multi-document band filter is
//! expressed as a grouped CTE so the hashband stream never surfaces
//! single-document bands. Pragmas trade durability for write throughput;
//! the store is a scratch artifact that a re-run rebuilds from the corpus.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{CandidateRow, HashbandRow, MatchRow, Store};

pub struct SqlStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqlStore {
    /// Open (and optionally re-create) the database at
    /// `<cache_dir>/cache.db`.
    pub fn open(cache_dir: &Path, initialize: bool) -> Result<Self, StoreError> {
        std::fs::create_dir_all(cache_dir).map_err(|source| StoreError::Io {
            path: cache_dir.to_owned(),
            source,
        })?;
        let path = cache_dir.join("cache.db");
        let conn = Connection::open(&path)?;

        // synchronous = OFF, temp_store = FILE; journal_mode returns a row
        // so it goes through query_row.
        conn.pragma_update(None, "synchronous", 0)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.pragma_update(None, "temp_store", 1)?;

        if initialize {
            conn.execute_batch(
                "DROP TABLE IF EXISTS hashbands;
                 DROP TABLE IF EXISTS candidates;
                 DROP TABLE IF EXISTS matches;
                 CREATE TABLE hashbands (
                     hashband TEXT,
                     file_id INTEGER,
                     window_id INTEGER
                 );
                 CREATE TABLE candidates (
                     file_id_a INTEGER,
                     file_id_b INTEGER,
                     window_id_a INTEGER,
                     window_id_b INTEGER,
                     UNIQUE(file_id_a, file_id_b, window_id_a, window_id_b)
                 );
                 CREATE TABLE matches (
                     file_id_a INTEGER,
                     file_id_b INTEGER,
                     window_id_a INTEGER,
                     window_id_b INTEGER,
                     similarity INTEGER
                 );",
            )?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Attempt to bring the database back to a writable state after a
    /// transient failure. The caller retries exactly once; a second failure
    /// propagates.
    fn repair(&self, conn: &Connection) {
        warn!(path = %self.path.display(), "attempting database repair");
        if let Err(err) = conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(())) {
            warn!(error = %err, "wal checkpoint during repair failed");
        }
    }

    fn write_with_retry<F>(&self, label: &str, mut write: F) -> Result<(), StoreError>
    where
        F: FnMut(&Connection) -> rusqlite::Result<()>,
    {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        match write(&conn) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, label, "store write failed; retrying once after repair");
                self.repair(&conn);
                write(&conn).map_err(StoreError::from)
            }
        }
    }
}

impl Store for SqlStore {
    fn write_hashbands(&self, rows: &[HashbandRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        debug!(count = rows.len(), "writing hashbands");
        self.write_with_retry("hashbands", |conn| {
            conn.execute_batch("BEGIN")?;
            let result = (|| {
                let mut stmt = conn.prepare_cached(
                    "INSERT INTO hashbands (hashband, file_id, window_id) VALUES (?1, ?2, ?3)",
                )?;
                for row in rows {
                    stmt.execute((&row.band, row.doc_id, row.window_id))?;
                }
                Ok(())
            })();
            match result {
                Ok(()) => conn.execute_batch("COMMIT"),
                Err(err) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    Err(err)
                }
            }
        })
    }

    fn write_candidates(&self, rows: &[CandidateRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        debug!(count = rows.len(), "writing candidates");
        self.write_with_retry("candidates", |conn| {
            conn.execute_batch("BEGIN")?;
            let result = (|| {
                let mut stmt = conn.prepare_cached(
                    "INSERT OR IGNORE INTO candidates
                     (file_id_a, file_id_b, window_id_a, window_id_b)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for row in rows {
                    stmt.execute((row.doc_a, row.doc_b, row.window_a, row.window_b))?;
                }
                Ok(())
            })();
            match result {
                Ok(()) => conn.execute_batch("COMMIT"),
                Err(err) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    Err(err)
                }
            }
        })
    }

    fn write_matches(&self, rows: &[MatchRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        debug!(count = rows.len(), "writing matches");
        self.write_with_retry("matches", |conn| {
            conn.execute_batch("BEGIN")?;
            let result = (|| {
                let mut stmt = conn.prepare_cached(
                    "INSERT INTO matches
                     (file_id_a, file_id_b, window_id_a, window_id_b, similarity)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for row in rows {
                    stmt.execute((
                        row.doc_a,
                        row.doc_b,
                        row.window_a,
                        row.window_b,
                        row.similarity,
                    ))?;
                }
                Ok(())
            })();
            match result {
                Ok(()) => conn.execute_batch("COMMIT"),
                Err(err) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    Err(err)
                }
            }
        })
    }

    fn scan_hashbands(
        &self,
        visitor: &mut dyn FnMut(HashbandRow) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        // Dedicated read connection: the candidate generator writes back to
        // this store while the scan is live, and WAL mode supports one
        // writer alongside readers.
        let conn = Connection::open(&self.path)?;
        let mut stmt = conn.prepare(
            "WITH multi AS (
                 SELECT hashband
                 FROM hashbands
                 GROUP BY hashband
                 HAVING COUNT(DISTINCT file_id) > 1
             )
             SELECT hashband, file_id, window_id
             FROM hashbands
             WHERE hashband IN (SELECT hashband FROM multi)
             ORDER BY hashband",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            visitor(HashbandRow {
                band: row.get(0)?,
                doc_id: row.get(1)?,
                window_id: row.get(2)?,
            })?;
        }
        Ok(())
    }

    fn candidate_pairs(&self) -> Result<Vec<(u32, u32)>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let mut stmt = conn.prepare(
            "SELECT DISTINCT file_id_a, file_id_b
             FROM candidates
             ORDER BY file_id_a, file_id_b",
        )?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }

    fn candidate_windows(&self, doc_a: u32, doc_b: u32) -> Result<Vec<(u32, u32)>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let mut stmt = conn.prepare(
            "SELECT DISTINCT window_id_a, window_id_b
             FROM candidates
             WHERE file_id_a = ?1 AND file_id_b = ?2
             ORDER BY window_id_a, window_id_b",
        )?;
        let windows = stmt
            .query_map((doc_a, doc_b), |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(windows)
    }

    fn match_pairs(&self) -> Result<Vec<(u32, u32)>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let mut stmt = conn.prepare(
            "SELECT DISTINCT file_id_a, file_id_b
             FROM matches
             ORDER BY file_id_a, file_id_b",
        )?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }

    fn pair_matches(&self, doc_a: u32, doc_b: u32) -> Result<Vec<MatchRow>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let mut stmt = conn.prepare(
            "SELECT window_id_a, window_id_b, similarity
             FROM matches
             WHERE file_id_a = ?1 AND file_id_b = ?2",
        )?;
        let matches = stmt
            .query_map((doc_a, doc_b), |row| {
                Ok(MatchRow {
                    doc_a,
                    doc_b,
                    window_a: row.get(0)?,
                    window_b: row.get(1)?,
                    similarity: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(matches)
    }

    fn all_matches(&self) -> Result<Vec<MatchRow>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let mut stmt = conn.prepare(
            "SELECT file_id_a, file_id_b, window_id_a, window_id_b, similarity FROM matches",
        )?;
        let matches = stmt
            .query_map([], |row| {
                Ok(MatchRow {
                    doc_a: row.get(0)?,
                    doc_b: row.get(1)?,
                    window_a: row.get(2)?,
                    window_b: row.get(3)?,
                    similarity: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(matches)
    }

    fn delete_matches(&self, endpoints: &HashSet<(u32, u32)>) -> Result<(), StoreError> {
        if endpoints.is_empty() {
            return Ok(());
        }
        debug!(count = endpoints.len(), "deleting banished endpoints");
        self.write_with_retry("delete_matches", |conn| {
            conn.execute_batch("BEGIN")?;
            let result = (|| {
                let mut stmt = conn.prepare_cached(
                    "DELETE FROM matches
                     WHERE (file_id_a = ?1 AND window_id_a = ?2)
                        OR (file_id_b = ?1 AND window_id_b = ?2)",
                )?;
                for &(doc_id, window_id) in endpoints {
                    stmt.execute((doc_id, window_id))?;
                }
                Ok(())
            })();
            match result {
                Ok(()) => conn.execute_batch("COMMIT"),
                Err(err) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    Err(err)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (tempfile::TempDir, SqlStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqlStore::open(dir.path(), true).unwrap();
        (dir, store)
    }

    fn band(b: &str, doc: u32, window: u32) -> HashbandRow {
        HashbandRow {
            band: b.to_string(),
            doc_id: doc,
            window_id: window,
        }
    }

    #[test]
    fn single_document_bands_are_suppressed() {
        let (_dir, store) = open_store();
        store
            .write_hashbands(&[
                band("1.2.3.4", 0, 0),
                band("1.2.3.4", 1, 5),
                band("9.9.9.9", 0, 1),
                band("9.9.9.9", 0, 2),
            ])
            .unwrap();

        let mut seen = Vec::new();
        store
            .scan_hashbands(&mut |row| {
                seen.push(row);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|r| r.band == "1.2.3.4"));
    }

    #[test]
    fn candidate_uniqueness_enforced() {
        let (_dir, store) = open_store();
        let row = CandidateRow {
            doc_a: 0,
            doc_b: 1,
            window_a: 2,
            window_b: 3,
        };
        store.write_candidates(&[row, row]).unwrap();
        store.write_candidates(&[row]).unwrap();
        assert_eq!(store.candidate_windows(0, 1).unwrap(), vec![(2, 3)]);
        assert_eq!(store.candidate_pairs().unwrap(), vec![(0, 1)]);
    }

    #[test]
    fn match_roundtrip_and_delete() {
        let (_dir, store) = open_store();
        let rows = [
            MatchRow {
                doc_a: 0,
                doc_b: 1,
                window_a: 0,
                window_b: 0,
                similarity: 90,
            },
            MatchRow {
                doc_a: 0,
                doc_b: 2,
                window_a: 1,
                window_b: 4,
                similarity: 60,
            },
        ];
        store.write_matches(&rows).unwrap();
        assert_eq!(store.match_pairs().unwrap(), vec![(0, 1), (0, 2)]);

        // Deleting endpoint (2, 4) removes the second row only.
        let endpoints = HashSet::from([(2u32, 4u32)]);
        store.delete_matches(&endpoints).unwrap();
        let remaining = store.all_matches().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].doc_b, 1);
    }
}
