use std::collections::HashSet;

use serde::Serialize;
use travis_github::{EntryKind, RepoEntry};

use super::paths::{depth, normalize_repo_path, repo_ancestors};

pub const DEFAULT_SENTINELS: &[&str] = &["index.file"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    Sentinel,
    Duplicate,
    InvalidPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: SkipReason,
}

/// Creation-ordered work for one sync run.
///
/// Every entry's parent directory is either the root or a folder that appears
/// earlier in `folders`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub folders: Vec<RepoEntry>,
    pub files: Vec<RepoEntry>,
    pub skipped: Vec<SkippedEntry>,
    pub implicit_folders: usize,
}

impl SyncPlan {
    pub fn total_entries(&self) -> usize {
        self.folders.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_entries() == 0
    }
}

#[derive(Debug, Clone)]
pub struct SyncPlanner {
    sentinels: Vec<String>,
}

impl Default for SyncPlanner {
    fn default() -> Self {
        Self::with_sentinels(DEFAULT_SENTINELS.iter().copied())
    }
}

impl SyncPlanner {
    pub fn with_sentinels<I, S>(sentinels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sentinels: sentinels
                .into_iter()
                .map(Into::<String>::into)
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    pub fn sentinels(&self) -> &[String] {
        &self.sentinels
    }

    pub fn is_sentinel(&self, path: &str) -> bool {
        self.sentinels.iter().any(|name| {
            path == name
                || path
                    .strip_suffix(name.as_str())
                    .is_some_and(|head| head.ends_with('/'))
        })
    }

    /// True when `path` or one of its ancestors is a sentinel; nothing below a
    /// sentinel is materialized.
    pub fn is_under_sentinel(&self, path: &str) -> bool {
        self.is_sentinel(path)
            || repo_ancestors(path)
                .iter()
                .any(|ancestor| self.is_sentinel(ancestor))
    }

    /// Builds the plan. Pure and deterministic for a given input order.
    pub fn plan(&self, entries: &[RepoEntry]) -> SyncPlan {
        let mut plan = SyncPlan::default();
        let mut seen = HashSet::new();
        let mut folders = Vec::new();

        for entry in entries {
            let path = match normalize_repo_path(&entry.path) {
                Ok(path) => path,
                Err(_) => {
                    plan.skipped.push(SkippedEntry {
                        path: entry.path.clone(),
                        reason: SkipReason::InvalidPath,
                    });
                    continue;
                }
            };
            if self.is_under_sentinel(&path) {
                plan.skipped.push(SkippedEntry {
                    path,
                    reason: SkipReason::Sentinel,
                });
                continue;
            }
            if !seen.insert(path.clone()) {
                plan.skipped.push(SkippedEntry {
                    path,
                    reason: SkipReason::Duplicate,
                });
                continue;
            }
            let normalized = RepoEntry {
                path,
                kind: entry.kind,
                content: entry.content.clone(),
            };
            match entry.kind {
                EntryKind::Folder => folders.push(normalized),
                EntryKind::File => plan.files.push(normalized),
            }
        }

        // Listings may omit directories that only exist implicitly in a path.
        let known: HashSet<String> = folders.iter().map(|f| f.path.clone()).collect();
        let mut synthesized = HashSet::new();
        let mut implicit = Vec::new();
        for path in folders
            .iter()
            .chain(plan.files.iter())
            .flat_map(|entry| repo_ancestors(&entry.path))
        {
            if !known.contains(&path) && synthesized.insert(path.clone()) {
                implicit.push(RepoEntry::folder(path));
            }
        }
        plan.implicit_folders = implicit.len();
        folders.extend(implicit);

        // Stable: equal depths keep discovery order.
        folders.sort_by_key(|folder| depth(&folder.path));
        plan.folders = folders;
        plan
    }
}
