use std::sync::Arc;

use crate::config::WorkspaceConfig;
use crate::store::FileStore;
use crate::sync::executor::SyncExecutor;
use crate::sync::guard::{SyncRejected, SyncSessionGuard};
use crate::sync::outcome::{RunStatus, SyncOutcome};
use crate::sync::source::{RepoSource, SyncTarget};

/// Replaces the workspace contents with a snapshot of a repository branch.
pub struct WorkspaceImporter {
    store: Arc<dyn FileStore>,
    executor: SyncExecutor,
    guard: SyncSessionGuard,
}

impl WorkspaceImporter {
    pub fn new(source: Arc<dyn RepoSource>, store: Arc<dyn FileStore>) -> Self {
        Self {
            executor: SyncExecutor::new(source, Arc::clone(&store)),
            store,
            guard: SyncSessionGuard::default(),
        }
    }

    pub fn from_config(
        config: &WorkspaceConfig,
        source: Arc<dyn RepoSource>,
        store: Arc<dyn FileStore>,
    ) -> Self {
        Self::new(source, store)
            .with_guard(config.session_guard())
            .configure(|executor| {
                executor
                    .with_planner(config.planner())
                    .with_retry(config.retry_policy())
                    .with_content_policy(config.content_policy())
            })
    }

    pub fn with_guard(mut self, guard: SyncSessionGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn configure(mut self, build: impl FnOnce(SyncExecutor) -> SyncExecutor) -> Self {
        self.executor = build(self.executor);
        self
    }

    pub fn executor(&self) -> &SyncExecutor {
        &self.executor
    }

    /// Clears the store and syncs `target` into it, subject to the session
    /// guard. A failed clear aborts before anything is fetched.
    pub async fn request_sync(&self, target: &SyncTarget) -> Result<SyncOutcome, SyncRejected> {
        self.guard.request_sync(|| self.replace_with(target)).await
    }

    pub fn last_outcome(&self) -> Option<SyncOutcome> {
        self.guard.last_outcome()
    }

    pub fn reset_sync_state(&self) {
        self.guard.reset_sync_state();
    }

    pub fn is_in_flight(&self) -> bool {
        self.guard.is_in_flight()
    }

    async fn replace_with(&self, target: &SyncTarget) -> SyncOutcome {
        if let Err(err) = self.store.delete_all().await {
            tracing::error!(repo = %target, error = %err, "failed to clear workspace before sync");
            return SyncOutcome::aborted(RunStatus::ClearFailed(err.to_string()));
        }
        self.executor.run(target).await
    }
}
