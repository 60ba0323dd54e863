use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::store::{FileStore, StoreError};

use super::outcome::{RunStatus, SyncOutcome};
use super::paths::{ROOT, local_path_for, missing_ancestors, name_of, parent_of};
use super::planner::{SyncPlan, SyncPlanner};
use super::progress::{ProgressCallback, SyncPhase, SyncProgress, emit};
use super::retry::RetryPolicy;
use super::source::{RepoSource, SyncTarget};

/// What to do with a file whose body could not be fetched.
///
/// `Skip` is the default: the file is reported in `failed_files` and left out
/// of the workspace, so a partial import never shows a file with silently
/// wrong (empty) content. `Placeholder` keeps the tree complete instead: the
/// file is created empty and reported in `degraded_files`, which also makes
/// the run fall short of `fully_succeeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentFailurePolicy {
    /// Record the file as failed and do not create it.
    #[default]
    Skip,
    /// Create the file with empty content and list it as degraded.
    Placeholder,
}

/// Materializes a remote tree into a [`FileStore`].
///
/// Runs are single-flight: a run requested while another one is in progress
/// on the same executor returns [`RunStatus::AlreadyRunning`] without touching
/// the store. Folders are created before files, shallowest first, and no
/// item-level failure aborts the run.
pub struct SyncExecutor {
    source: Arc<dyn RepoSource>,
    store: Arc<dyn FileStore>,
    planner: SyncPlanner,
    retry: RetryPolicy,
    content_policy: ContentFailurePolicy,
    progress: Option<ProgressCallback>,
    phase: Mutex<SyncPhase>,
}

impl SyncExecutor {
    pub fn new(source: Arc<dyn RepoSource>, store: Arc<dyn FileStore>) -> Self {
        Self {
            source,
            store,
            planner: SyncPlanner::default(),
            retry: RetryPolicy::default(),
            content_policy: ContentFailurePolicy::default(),
            progress: None,
            phase: Mutex::new(SyncPhase::Idle),
        }
    }

    pub fn with_planner(mut self, planner: SyncPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_content_policy(mut self, policy: ContentFailurePolicy) -> Self {
        self.content_policy = policy;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn phase(&self) -> SyncPhase {
        *lock_phase(&self.phase)
    }

    pub fn is_running(&self) -> bool {
        self.phase() != SyncPhase::Idle
    }

    /// Fetches, plans and materializes `target`. Never fails: fatal problems
    /// are reported through [`SyncOutcome::status`].
    pub async fn run(&self, target: &SyncTarget) -> SyncOutcome {
        let Some(run) = RunGuard::acquire(&self.phase, SyncPhase::Fetching) else {
            tracing::info!(repo = %target, "sync already in progress, rejecting run");
            return SyncOutcome::aborted(RunStatus::AlreadyRunning);
        };
        tracing::info!(repo = %target, "sync started");
        self.enter(&run, SyncPhase::Fetching);

        let entries = match self.source.fetch_tree(target).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!(repo = %target, error = %err, "failed to fetch repository tree");
                return SyncOutcome::aborted(RunStatus::FetchFailed(err.to_string()));
            }
        };
        if entries.is_empty() {
            tracing::warn!(repo = %target, "repository is empty, nothing to sync");
            return SyncOutcome::aborted(RunStatus::EmptyRepository);
        }

        self.enter(&run, SyncPhase::Planning);
        let plan = self.planner.plan(&entries);
        self.apply(target, &plan, &run).await
    }

    /// Materializes an already built plan. Plans that omit parent folders are
    /// accepted; missing ancestors are created on demand.
    pub async fn run_plan(&self, target: &SyncTarget, plan: &SyncPlan) -> SyncOutcome {
        let Some(run) = RunGuard::acquire(&self.phase, SyncPhase::Planning) else {
            tracing::info!(repo = %target, "sync already in progress, rejecting plan");
            return SyncOutcome::aborted(RunStatus::AlreadyRunning);
        };
        self.apply(target, plan, &run).await
    }

    async fn apply(&self, target: &SyncTarget, plan: &SyncPlan, run: &RunGuard<'_>) -> SyncOutcome {
        tracing::info!(
            repo = %target,
            folders = plan.folders.len(),
            files = plan.files.len(),
            skipped = plan.skipped.len(),
            implicit_folders = plan.implicit_folders,
            "sync plan ready"
        );
        emit(
            self.progress.as_ref(),
            SyncProgress::Planned {
                folders: plan.folders.len(),
                files: plan.files.len(),
                skipped: plan.skipped.len(),
            },
        );

        let mut outcome = SyncOutcome {
            skipped_entries: plan.skipped.len(),
            total_files: plan.files.len(),
            ..SyncOutcome::default()
        };
        let mut folders = FolderStatus::new();

        self.enter(run, SyncPhase::CreatingFolders);
        for folder in &plan.folders {
            let local = local_path_for(&folder.path);
            if folders.exists(&local) {
                continue;
            }
            self.ensure_ancestors(&parent_of(&local), &mut folders, &mut outcome)
                .await;
            self.create_folder(&local, &mut folders, &mut outcome).await;
        }

        self.enter(run, SyncPhase::CreatingFiles);
        for file in &plan.files {
            let local = local_path_for(&file.path);
            let parent = parent_of(&local);
            self.ensure_ancestors(&parent, &mut folders, &mut outcome)
                .await;

            let content = match &file.content {
                Some(content) => content.clone(),
                None => match self.source.fetch_file(target, &file.path).await {
                    Ok(content) => content,
                    Err(err) => match self.content_policy {
                        ContentFailurePolicy::Skip => {
                            tracing::warn!(path = %file.path, error = %err, "content fetch failed, skipping file");
                            self.record_file_failure(&local, &err.to_string(), &mut outcome);
                            continue;
                        }
                        ContentFailurePolicy::Placeholder => {
                            tracing::warn!(path = %file.path, error = %err, "content fetch failed, creating empty file");
                            outcome.degraded_files.push(display_path(&local));
                            String::new()
                        }
                    },
                },
            };

            let name = name_of(&local);
            let result = self
                .retry
                .run_until(
                    &local,
                    || self.store.create_file(&parent, name, &content),
                    StoreError::is_conflict,
                )
                .await;
            match result {
                Ok(()) => {
                    tracing::debug!(path = %local, "file created");
                    outcome.created_files += 1;
                    emit(
                        self.progress.as_ref(),
                        SyncProgress::FileCreated {
                            path: display_path(&local),
                        },
                    );
                }
                Err(err) => {
                    tracing::warn!(path = %local, error = %err, "file creation failed");
                    self.record_file_failure(&local, &err.to_string(), &mut outcome);
                }
            }
        }

        self.enter(run, SyncPhase::Reporting);
        tracing::info!(
            repo = %target,
            created_folders = outcome.created_folders,
            created_files = outcome.created_files,
            errors = outcome.error_count(),
            "{}",
            outcome.summary()
        );
        outcome
    }

    /// Creates every missing directory from the root down to `dir`.
    async fn ensure_ancestors(
        &self,
        dir: &str,
        folders: &mut FolderStatus,
        outcome: &mut SyncOutcome,
    ) {
        let missing = missing_ancestors(dir, |path| folders.exists(path));
        for path in missing {
            tracing::debug!(path = %path, "creating implicit parent folder");
            self.create_folder(&path, folders, outcome).await;
        }
    }

    // The folder is marked as existing even when creation fails so that its
    // children are still attempted.
    async fn create_folder(
        &self,
        local: &str,
        folders: &mut FolderStatus,
        outcome: &mut SyncOutcome,
    ) {
        let parent = parent_of(local);
        let name = name_of(local);
        let result = self
            .retry
            .run_until(
                local,
                || self.store.create_folder(&parent, name),
                StoreError::is_conflict,
            )
            .await;
        match result {
            Ok(()) => {
                tracing::debug!(path = %local, "folder created");
                outcome.created_folders += 1;
                emit(
                    self.progress.as_ref(),
                    SyncProgress::FolderCreated {
                        path: display_path(local),
                    },
                );
            }
            Err(err) if err.is_conflict() => {
                tracing::debug!(path = %local, "folder already exists");
            }
            Err(err) => {
                tracing::warn!(path = %local, error = %err, "folder creation failed");
                outcome.failed_folders.push(display_path(local));
                emit(
                    self.progress.as_ref(),
                    SyncProgress::FolderFailed {
                        path: display_path(local),
                        error: err.to_string(),
                    },
                );
            }
        }
        folders.mark(local);
    }

    fn record_file_failure(&self, local: &str, error: &str, outcome: &mut SyncOutcome) {
        outcome.failed_files.push(display_path(local));
        emit(
            self.progress.as_ref(),
            SyncProgress::FileFailed {
                path: display_path(local),
                error: error.to_string(),
            },
        );
    }

    fn enter(&self, run: &RunGuard<'_>, phase: SyncPhase) {
        run.set(phase);
        emit(self.progress.as_ref(), SyncProgress::Phase { phase });
    }
}

/// Folder existence for one run, seeded with the root.
struct FolderStatus(HashMap<String, bool>);

impl FolderStatus {
    fn new() -> Self {
        Self(HashMap::from([(ROOT.to_string(), true)]))
    }

    fn exists(&self, path: &str) -> bool {
        self.0.get(path).copied().unwrap_or(false)
    }

    fn mark(&mut self, path: &str) {
        self.0.insert(path.to_string(), true);
    }
}

/// Holds the executor out of `Idle` for the lifetime of one run.
struct RunGuard<'a> {
    phase: &'a Mutex<SyncPhase>,
}

impl<'a> RunGuard<'a> {
    fn acquire(phase: &'a Mutex<SyncPhase>, initial: SyncPhase) -> Option<Self> {
        let mut current = lock_phase(phase);
        if *current != SyncPhase::Idle {
            return None;
        }
        *current = initial;
        Some(Self { phase })
    }

    fn set(&self, next: SyncPhase) {
        *lock_phase(self.phase) = next;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *lock_phase(self.phase) = SyncPhase::Idle;
    }
}

fn lock_phase(phase: &Mutex<SyncPhase>) -> MutexGuard<'_, SyncPhase> {
    phase.lock().unwrap_or_else(PoisonError::into_inner)
}

fn display_path(local: &str) -> String {
    local.trim_start_matches('/').to_string()
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
