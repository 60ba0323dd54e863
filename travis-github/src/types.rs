use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Owner {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Repo {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: Owner,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BranchCommit {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Branch {
    pub name: String,
    pub commit: BranchCommit,
    #[serde(default)]
    pub protected: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    File,
    Dir,
    Symlink,
    Submodule,
}

/// One item of a `/contents` response, either from a directory listing or a
/// single-file lookup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContentItem {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

/// A node of a remote repository tree, addressed by its repository-relative
/// path (`src/lib.rs`, no leading slash).
///
/// `content` is only a hint: most listings do not inline file bodies, so
/// callers fetch them separately when it is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoEntry {
    pub path: String,
    pub kind: EntryKind,
    #[serde(default)]
    pub content: Option<String>,
}

impl RepoEntry {
    pub fn folder(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Folder,
            content: None,
        }
    }

    pub fn file(path: impl Into<String>, content: Option<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            content,
        }
    }

    pub fn depth(&self) -> usize {
        self.path.matches('/').count()
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}
