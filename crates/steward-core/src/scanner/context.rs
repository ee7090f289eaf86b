use super::record::FileRecord;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Aggregate facts about one directory, gathered during the candidate pass.
#[derive(Debug, Clone, Default)]
pub struct DirectoryStats {
    pub file_count: usize,
    pub newest_modified: Option<DateTime<Utc>>,
    pub extension_counts: HashMap<String, usize>,
}

impl DirectoryStats {
    fn observe(&mut self, record: &FileRecord) {
        self.file_count += 1;
        if let Some(modified) = record.modified {
            if self.newest_modified.map_or(true, |newest| modified > newest) {
                self.newest_modified = Some(modified);
            }
        }
        *self.extension_counts.entry(record.extension()).or_default() += 1;
    }

    pub fn same_extension_count(&self, extension: &str) -> usize {
        self.extension_counts.get(extension).copied().unwrap_or(0)
    }
}

/// Per-directory statistics for every directory the source touched.
#[derive(Debug, Default)]
pub struct DirectoryContext {
    dirs: DashMap<PathBuf, DirectoryStats>,
}

impl DirectoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Safe to call from several rayon workers at once.
    pub fn observe(&self, record: &FileRecord) {
        self.dirs
            .entry(record.parent_dir().to_path_buf())
            .or_default()
            .observe(record);
    }

    pub fn stats(&self, dir: &Path) -> Option<DirectoryStats> {
        self.dirs.get(dir).map(|entry| entry.value().clone())
    }

    pub fn directory_count(&self) -> usize {
        self.dirs.len()
    }
}
