use std::sync::Arc;

use serde::Serialize;
use travis_github::GithubClient;

use crate::store::{FileStore, NodeKind, StoreError};
use crate::sync::source::SyncTarget;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub saved: Vec<String>,
    pub failed: Vec<String>,
}

impl PublishOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "committed {} files, {} failed",
            self.saved.len(),
            self.failed.len()
        )
    }
}

/// Pushes workspace files back to a repository branch, one commit per file.
pub struct WorkspacePublisher {
    client: GithubClient,
    store: Arc<dyn FileStore>,
}

impl WorkspacePublisher {
    pub fn new(client: GithubClient, store: Arc<dyn FileStore>) -> Self {
        Self { client, store }
    }

    /// Commits every stored file (or only those under `only`, a repository
    /// path prefix) to `target`. Individual rejections are collected in the
    /// outcome; only a failure to read the store is an error.
    pub async fn publish(
        &self,
        target: &SyncTarget,
        message: &str,
        only: Option<&str>,
    ) -> Result<PublishOutcome, StoreError> {
        let prefix = only.map(|value| value.trim_matches('/')).filter(|value| !value.is_empty());
        let mut outcome = PublishOutcome::default();
        for node in self.store.list().await? {
            if node.kind != NodeKind::File {
                continue;
            }
            let relative = node.path.trim_start_matches('/');
            if let Some(prefix) = prefix
                && !is_under(relative, prefix)
            {
                continue;
            }
            let repo_path = repo_path_for(target, relative);
            let content = node.content.unwrap_or_default();
            match self
                .client
                .save_file(&target.full_name(), &repo_path, &content, message, &target.branch)
                .await
            {
                Ok(true) => {
                    tracing::debug!(path = %repo_path, "file committed");
                    outcome.saved.push(repo_path);
                }
                Ok(false) => outcome.failed.push(repo_path),
                Err(err) => {
                    tracing::warn!(path = %repo_path, error = %err, "failed to commit file");
                    outcome.failed.push(repo_path);
                }
            }
        }
        tracing::info!(
            repo = %target,
            saved = outcome.saved.len(),
            failed = outcome.failed.len(),
            "publish finished"
        );
        Ok(outcome)
    }
}

fn is_under(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn repo_path_for(target: &SyncTarget, relative: &str) -> String {
    let base = target.path.trim_matches('/');
    if base.is_empty() {
        relative.to_string()
    } else {
        format!("{base}/{relative}")
    }
}
