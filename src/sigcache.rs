//! Per-document signature cache.
//!
//! Signatures are memoized to one binary file per document under
//! `<cache>/minhashes/`, named after the document path with separators
//! escaped. The format is a private contract: a fixed magic, the window
//! count and signature length, then the little-endian u32 values. A file
//! that fails any structural check is treated as a cache miss and
//! overwritten; staleness against edited inputs is not detected here.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SigCacheError;

const MAGIC: &[u8; 4] = b"TRSG";
const HEADER_LEN: usize = 4 + 4 + 4;

pub struct SignatureCache {
    dir: PathBuf,
}

impl SignatureCache {
    /// Open the cache directory, creating it if needed.
    pub fn open(cache_dir: &Path) -> Result<Self, SigCacheError> {
        let dir = cache_dir.join("minhashes");
        fs::create_dir_all(&dir).map_err(|source| SigCacheError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Cache file for a document path, with separators escaped so the flat
    /// directory stays collision free for real inputs.
    pub fn path_for(&self, doc_path: &Path) -> PathBuf {
        let escaped: String = doc_path
            .to_string_lossy()
            .chars()
            .map(|c| if c == '/' || c == '\\' || c == ':' { '_' } else { c })
            .collect();
        self.dir.join(format!("{escaped}.sig"))
    }

    /// Load cached signatures. `Ok(None)` means no cache file exists;
    /// `Err(Corrupt)` means the file is structurally invalid and should be
    /// recomputed and overwritten.
    pub fn load(&self, doc_path: &Path) -> Result<Option<Vec<Vec<u32>>>, SigCacheError> {
        let path = self.path_for(doc_path);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(SigCacheError::Io { path, source }),
        };
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(SigCacheError::Corrupt { path });
        }
        let windows = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let k = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let expected = HEADER_LEN + windows * k * 4;
        if bytes.len() != expected {
            return Err(SigCacheError::Corrupt { path });
        }
        let mut signatures = Vec::with_capacity(windows);
        let mut offset = HEADER_LEN;
        for _ in 0..windows {
            let mut signature = Vec::with_capacity(k);
            for _ in 0..k {
                signature.push(u32::from_le_bytes(
                    bytes[offset..offset + 4].try_into().unwrap(),
                ));
                offset += 4;
            }
            signatures.push(signature);
        }
        Ok(Some(signatures))
    }

    /// Persist signatures for a document, replacing any previous file.
    pub fn store(&self, doc_path: &Path, signatures: &[Vec<u32>]) -> Result<(), SigCacheError> {
        let k = signatures.first().map_or(0, Vec::len);
        let mut bytes = Vec::with_capacity(HEADER_LEN + signatures.len() * k * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&(signatures.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(k as u32).to_le_bytes());
        for signature in signatures {
            for value in signature {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        let path = self.path_for(doc_path);
        fs::write(&path, bytes).map_err(|source| SigCacheError::Io { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SignatureCache::open(dir.path()).unwrap();
        let doc = Path::new("corpus/alpha.txt");
        let signatures = vec![vec![1u32, 2, 3], vec![u32::MAX, 0, 7]];

        assert!(cache.load(doc).unwrap().is_none());
        cache.store(doc, &signatures).unwrap();
        assert_eq!(cache.load(doc).unwrap(), Some(signatures));
    }

    #[test]
    fn empty_document_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SignatureCache::open(dir.path()).unwrap();
        let doc = Path::new("corpus/empty.txt");
        cache.store(doc, &[]).unwrap();
        assert_eq!(cache.load(doc).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SignatureCache::open(dir.path()).unwrap();
        let doc = Path::new("corpus/beta.txt");
        fs::write(cache.path_for(doc), b"garbage").unwrap();
        assert!(matches!(
            cache.load(doc),
            Err(SigCacheError::Corrupt { .. })
        ));
    }

    #[test]
    fn distinct_paths_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SignatureCache::open(dir.path()).unwrap();
        assert_ne!(
            cache.path_for(Path::new("a/b.txt")),
            cache.path_for(Path::new("a/c.txt"))
        );
    }
}
