use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use travis_github::{GithubClient, GithubError, RepoEntry, split_full_name};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Github(#[from] GithubError),
    #[error("{0}")]
    Other(String),
}

/// Which branch (and optionally which subdirectory) of a repository to sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncTarget {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub path: String,
}

impl SyncTarget {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
            path: String::new(),
        }
    }

    pub fn parse(full_name: &str, branch: impl Into<String>) -> Result<Self, SourceError> {
        let (owner, repo) = split_full_name(full_name)?;
        Ok(Self::new(owner, repo, branch))
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)?;
        if !self.path.is_empty() {
            write!(f, ":{}", self.path)?;
        }
        Ok(())
    }
}

/// Read access to a remote repository tree.
#[async_trait]
pub trait RepoSource: Send + Sync {
    async fn fetch_tree(&self, target: &SyncTarget) -> Result<Vec<RepoEntry>, SourceError>;

    async fn fetch_file(&self, target: &SyncTarget, path: &str) -> Result<String, SourceError>;
}

#[async_trait]
impl RepoSource for GithubClient {
    async fn fetch_tree(&self, target: &SyncTarget) -> Result<Vec<RepoEntry>, SourceError> {
        Ok(self
            .fetch_directory_contents(&target.owner, &target.repo, &target.path, &target.branch)
            .await?)
    }

    async fn fetch_file(&self, target: &SyncTarget, path: &str) -> Result<String, SourceError> {
        Ok(self
            .fetch_file_content(&target.full_name(), path, &target.branch)
            .await?)
    }
}
