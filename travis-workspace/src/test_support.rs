//! In-memory doubles for the store and the remote source.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use travis_github::RepoEntry;

use crate::store::{FileStore, NodeKind, StoreError, StoredNode};
use crate::sync::paths::{ROOT, join};
use crate::sync::source::{RepoSource, SourceError, SyncTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    CreateFolder { parent: String, name: String },
    CreateFile { parent: String, name: String },
    DeleteAll,
}

#[derive(Default)]
struct MemoryState {
    folders: HashSet<String>,
    files: HashMap<String, String>,
    calls: Vec<StoreCall>,
    always_fail: HashSet<String>,
    fail_times: HashMap<String, u32>,
    fail_delete_all: bool,
}

/// Tree-shaped store that enforces parent existence and name uniqueness and
/// records every call.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every creation of `path` fails.
    pub fn fail_always(&self, path: &str) {
        self.state.lock().unwrap().always_fail.insert(path.to_string());
    }

    /// The next `times` creations of `path` fail.
    pub fn fail_times(&self, path: &str, times: u32) {
        self.state
            .lock()
            .unwrap()
            .fail_times
            .insert(path.to_string(), times);
    }

    pub fn fail_delete_all(&self) {
        self.state.lock().unwrap().fail_delete_all = true;
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn has_folder(&self, path: &str) -> bool {
        self.state.lock().unwrap().folders.contains(path)
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().unwrap().files.len()
    }

    fn create(
        &self,
        parent: &str,
        name: &str,
        kind: NodeKind,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let path = join(parent, name);
        state.calls.push(match kind {
            NodeKind::Folder => StoreCall::CreateFolder {
                parent: parent.to_string(),
                name: name.to_string(),
            },
            NodeKind::File => StoreCall::CreateFile {
                parent: parent.to_string(),
                name: name.to_string(),
            },
        });
        if state.always_fail.contains(&path) {
            return Err(StoreError::Io(std::io::Error::other("injected failure")));
        }
        if let Some(remaining) = state.fail_times.get_mut(&path)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(StoreError::Io(std::io::Error::other("injected transient failure")));
        }
        if parent != ROOT && !state.folders.contains(parent) {
            return Err(StoreError::ParentMissing(parent.to_string()));
        }
        if state.folders.contains(&path) || state.files.contains_key(&path) {
            return Err(StoreError::AlreadyExists(path));
        }
        match kind {
            NodeKind::Folder => {
                state.folders.insert(path);
            }
            NodeKind::File => {
                state.files.insert(path, content.to_string());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn create_folder(&self, parent: &str, name: &str) -> Result<(), StoreError> {
        self.create(parent, name, NodeKind::Folder, "")
    }

    async fn create_file(
        &self,
        parent: &str,
        name: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        self.create(parent, name, NodeKind::File, content)
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(StoreCall::DeleteAll);
        if state.fail_delete_all {
            return Err(StoreError::Io(std::io::Error::other("disk unavailable")));
        }
        state.folders.clear();
        state.files.clear();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredNode>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut nodes: Vec<StoredNode> = state
            .folders
            .iter()
            .map(|path| node(path, NodeKind::Folder, None))
            .chain(
                state
                    .files
                    .iter()
                    .map(|(path, content)| node(path, NodeKind::File, Some(content.clone()))),
            )
            .collect();
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(nodes)
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>, StoreError> {
        Ok(self.file(path))
    }
}

fn node(path: &str, kind: NodeKind, content: Option<String>) -> StoredNode {
    let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
    StoredNode {
        path: path.to_string(),
        parent_path: if parent.is_empty() {
            ROOT.to_string()
        } else {
            parent.to_string()
        },
        name: name.to_string(),
        kind,
        content,
    }
}

/// Serves a fixed tree; file bodies come from `contents` (a missing key is a
/// fetch error).
#[derive(Default)]
pub struct StaticSource {
    entries: Vec<RepoEntry>,
    contents: HashMap<String, String>,
    tree_error: Option<String>,
    gate: Option<Arc<Notify>>,
    file_fetches: Mutex<Vec<String>>,
    tree_fetches: Mutex<usize>,
}

impl StaticSource {
    pub fn new(entries: Vec<RepoEntry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            tree_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, path: &str, content: &str) -> Self {
        self.contents.insert(path.to_string(), content.to_string());
        self
    }

    /// `fetch_tree` waits for a notification before answering.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn file_fetches(&self) -> Vec<String> {
        self.file_fetches.lock().unwrap().clone()
    }

    pub fn tree_fetches(&self) -> usize {
        *self.tree_fetches.lock().unwrap()
    }
}

#[async_trait]
impl RepoSource for StaticSource {
    async fn fetch_tree(&self, _target: &SyncTarget) -> Result<Vec<RepoEntry>, SourceError> {
        *self.tree_fetches.lock().unwrap() += 1;
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.tree_error {
            Some(message) => Err(SourceError::Other(message.clone())),
            None => Ok(self.entries.clone()),
        }
    }

    async fn fetch_file(&self, _target: &SyncTarget, path: &str) -> Result<String, SourceError> {
        self.file_fetches.lock().unwrap().push(path.to_string());
        self.contents
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::Other(format!("no content for {path}")))
    }
}

pub fn target() -> SyncTarget {
    SyncTarget::new("octo", "hello", "main")
}
