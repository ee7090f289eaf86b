use crate::error::{Issue, IssueKind};
use crate::hasher::xxhash;
use crate::scanner::FileRecord;
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Files verified identical by their full BLAKE3 hash.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub content_hash: String,
    pub file_size: u64,
    /// Sorted by path.
    pub members: Vec<PathBuf>,
    pub keeper: PathBuf,
}

impl DuplicateGroup {
    fn from_records(content_hash: String, file_size: u64, records: &[&FileRecord]) -> Option<Self> {
        // Earliest modification wins; unknown times never beat known ones.
        let keeper = records
            .iter()
            .min_by(|a, b| {
                (a.modified.is_none(), a.modified, &a.path)
                    .cmp(&(b.modified.is_none(), b.modified, &b.path))
            })?
            .path
            .clone();

        let mut members: Vec<PathBuf> = records.iter().map(|r| r.path.clone()).collect();
        members.sort();

        Some(Self {
            content_hash,
            file_size,
            members,
            keeper,
        })
    }

    pub fn non_keepers(&self) -> impl Iterator<Item = &PathBuf> {
        self.members.iter().filter(move |p| **p != self.keeper)
    }

    pub fn wasted_bytes(&self) -> u64 {
        self.file_size * (self.members.len() as u64 - 1)
    }
}

/// Result of a detection pass, consulted by the feature extractor.
#[derive(Debug, Default)]
pub struct DuplicateCatalog {
    groups: Vec<DuplicateGroup>,
    redundant: HashSet<PathBuf>,
    issues: Vec<Issue>,
}

impl DuplicateCatalog {
    fn new(mut groups: Vec<DuplicateGroup>, issues: Vec<Issue>) -> Self {
        groups.sort_by(|a, b| a.content_hash.cmp(&b.content_hash));
        let redundant = groups
            .iter()
            .flat_map(|g| g.non_keepers().cloned())
            .collect();
        Self {
            groups,
            redundant,
            issues,
        }
    }

    pub fn groups(&self) -> &[DuplicateGroup] {
        &self.groups
    }

    /// True for every group member except the keeper.
    pub fn is_redundant(&self, path: &Path) -> bool {
        self.redundant.contains(path)
    }

    /// DuplicateSignal feature: 1.0 for non-keepers, 0.0 otherwise.
    pub fn signal(&self, path: &Path) -> f64 {
        if self.is_redundant(path) {
            1.0
        } else {
            0.0
        }
    }

    pub fn wasted_bytes(&self) -> u64 {
        self.groups.iter().map(|g| g.wasted_bytes()).sum()
    }

    /// Files that could not be hashed; they are left out of every group.
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }
}

/// Collects candidates by size, then confirms duplicates with two hash tiers:
/// 1. XxHash64 of a 4KB head sample splits each size bucket
/// 2. BLAKE3 of the full content, only inside tier-1 buckets with >1 file
///
/// Only equal tier-2 hashes put files in the same group.
#[derive(Debug, Default)]
pub struct DuplicateDetector {
    size_to_files: DashMap<u64, Vec<FileRecord>>,
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a candidate. Unreadable and empty files are never grouped.
    pub fn add(&self, record: &FileRecord) {
        if record.readable && record.size > 0 {
            self.size_to_files
                .entry(record.size)
                .or_default()
                .push(record.clone());
        }
    }

    pub fn candidate_count(&self) -> usize {
        self.size_to_files.iter().map(|e| e.value().len()).sum()
    }

    pub fn detect(self) -> DuplicateCatalog {
        let buckets: Vec<(u64, Vec<FileRecord>)> = self
            .size_to_files
            .into_iter()
            .filter(|(_, files)| files.len() > 1)
            .collect();
        debug!("{} size buckets with more than one file", buckets.len());

        let (groups, issues): (Vec<Vec<DuplicateGroup>>, Vec<Vec<Issue>>) = buckets
            .par_iter()
            .map(|(size, files)| group_size_bucket(*size, files))
            .unzip();

        let groups: Vec<DuplicateGroup> = groups.into_iter().flatten().collect();
        let issues: Vec<Issue> = issues.into_iter().flatten().collect();
        debug!(
            "{} duplicate groups confirmed, {} files could not be hashed",
            groups.len(),
            issues.len()
        );
        DuplicateCatalog::new(groups, issues)
    }
}

fn group_size_bucket(size: u64, files: &[FileRecord]) -> (Vec<DuplicateGroup>, Vec<Issue>) {
    let sample_to_files: DashMap<u64, Vec<&FileRecord>> = DashMap::new();
    let full_to_files: DashMap<String, Vec<&FileRecord>> = DashMap::new();

    // First pass: cheap sample digest
    let mut issues: Vec<Issue> = files
        .par_iter()
        .filter_map(|file| match xxhash::sample_digest(&file.path) {
            Ok(digest) => {
                sample_to_files.entry(digest).or_default().push(file);
                None
            }
            Err(e) => Some(hash_issue(file, e)),
        })
        .collect();

    // Second pass: full hash only where the sample collided
    let sample_buckets: Vec<Vec<&FileRecord>> = sample_to_files
        .into_iter()
        .map(|(_, files)| files)
        .filter(|files| files.len() > 1)
        .collect();
    let full_issues: Vec<Issue> = sample_buckets
        .par_iter()
        .flat_map_iter(|bucket| bucket.iter())
        .filter_map(|file| match file.content_hash() {
            Ok(hash) => {
                full_to_files.entry(hash.to_string()).or_default().push(*file);
                None
            }
            Err(e) => Some(hash_issue(file, e)),
        })
        .collect();
    issues.extend(full_issues);

    let groups = full_to_files
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .filter_map(|(hash, files)| DuplicateGroup::from_records(hash, size, &files))
        .collect();

    (groups, issues)
}

fn hash_issue(file: &FileRecord, err: std::io::Error) -> Issue {
    warn!("Error hashing file '{}': {}", file.path.display(), err);
    Issue::new(&file.path, IssueKind::ScanError, format!("hashing failed: {}", err))
}
