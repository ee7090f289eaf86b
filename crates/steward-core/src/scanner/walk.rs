use super::record::{FileRecord, FileSource};
use chrono::{DateTime, Utc};
use glob::Pattern;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::error;
use walkdir::{DirEntry, WalkDir};

/// Local filesystem source. Walks each root lazily, skipping symlinks,
/// ignored globs and excluded directories (such as the organize target).
pub struct WalkSource {
    roots: Vec<PathBuf>,
    ignore_patterns: Vec<Pattern>,
    excluded_dirs: Vec<PathBuf>,
}

impl WalkSource {
    pub fn new<P: AsRef<Path>>(root_paths: &[P], ignore_globs: &[String]) -> Self {
        let ignore_patterns = ignore_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();

        Self {
            roots: root_paths.iter().map(|r| r.as_ref().to_path_buf()).collect(),
            ignore_patterns,
            excluded_dirs: Vec::new(),
        }
    }

    pub fn exclude_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded_dirs.push(dir.into());
        self
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns.iter().any(|p| p.matches_path(path))
            || self.excluded_dirs.iter().any(|d| path.starts_with(d))
    }

    fn keep_entry(&self, entry: &DirEntry) -> bool {
        entry.depth() == 0 || !self.is_ignored(entry.path())
    }
}

impl FileSource for WalkSource {
    fn records(&self) -> Box<dyn Iterator<Item = FileRecord> + Send + '_> {
        let iter = self.roots.iter().flat_map(move |root| {
            WalkDir::new(root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(move |entry| self.keep_entry(entry))
                .filter_map(|entry| match entry {
                    Ok(entry) if entry.file_type().is_file() => Some(snapshot(entry.path())),
                    Ok(_) => None,
                    Err(err) => {
                        // A file we could not stat still becomes a (degraded) record.
                        match err.path() {
                            Some(path) if !path.is_dir() => {
                                error!("Error reading {}: {}", path.display(), err);
                                Some(FileRecord::unreadable(path))
                            }
                            _ => {
                                error!("Error walking directory: {}", err);
                                None
                            }
                        }
                    }
                })
        });
        Box::new(iter)
    }
}

fn snapshot(path: &Path) -> FileRecord {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            error!("Error getting metadata for {}: {}", path.display(), e);
            return FileRecord::unreadable(path);
        }
    };

    let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
    let readable = File::open(path).is_ok();
    FileRecord::new(path, metadata.len(), modified, readable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_walk_respects_ignore_and_exclusions() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("keep")).unwrap();
        fs::create_dir_all(root.join("node_modules")).unwrap();
        fs::create_dir_all(root.join("organized")).unwrap();
        fs::write(root.join("keep/a.txt"), "a").unwrap();
        fs::write(root.join("node_modules/b.js"), "b").unwrap();
        fs::write(root.join("organized/c.txt"), "c").unwrap();

        let source = WalkSource::new(
            &[root.to_string_lossy().into_owned()],
            &["*/node_modules".to_string()],
        )
        .exclude_dir(root.join("organized"));

        let paths: Vec<PathBuf> = source.records().map(|r| r.path).collect();
        assert_eq!(paths, vec![root.join("keep/a.txt")]);
    }

    #[test]
    fn test_snapshot_captures_metadata() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("f.bin");
        fs::write(&path, vec![0u8; 42]).unwrap();

        let record = snapshot(&path);
        assert_eq!(record.size, 42);
        assert!(record.readable);
        assert!(record.modified.is_some());
    }
}
