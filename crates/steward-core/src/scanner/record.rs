use crate::hasher;
use chrono::{DateTime, Utc};
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Immutable snapshot of one filesystem entry, taken at scan time.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub readable: bool,
    content_hash: OnceLock<String>,
}

impl FileRecord {
    pub fn new(
        path: impl Into<PathBuf>,
        size: u64,
        modified: Option<DateTime<Utc>>,
        readable: bool,
    ) -> Self {
        Self {
            path: path.into(),
            size,
            modified,
            readable,
            content_hash: OnceLock::new(),
        }
    }

    /// Record for an entry whose metadata could not be read.
    pub fn unreadable(path: impl Into<PathBuf>) -> Self {
        Self::new(path, 0, None, false)
    }

    /// Full BLAKE3 content hash, computed on first use and reused afterwards.
    pub fn content_hash(&self) -> io::Result<&str> {
        if let Some(hash) = self.content_hash.get() {
            return Ok(hash);
        }
        let hash = hasher::content::hash_file(&self.path)?;
        Ok(self.content_hash.get_or_init(|| hash))
    }

    pub fn parent_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Raw file name, byte for byte. Empty for paths ending in `..`.
    pub fn file_name(&self) -> &OsStr {
        self.path.file_name().unwrap_or_default()
    }

    /// Lower-cased extension without the dot, empty when there is none.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

/// Upstream supplier of file records.
///
/// Every call to `records` starts a fresh pass, so the engine can walk the
/// source more than once without holding the whole listing in memory.
pub trait FileSource: Send + Sync {
    fn records(&self) -> Box<dyn Iterator<Item = FileRecord> + Send + '_>;
}

impl FileSource for Vec<FileRecord> {
    fn records(&self) -> Box<dyn Iterator<Item = FileRecord> + Send + '_> {
        Box::new(self.iter().cloned())
    }
}
