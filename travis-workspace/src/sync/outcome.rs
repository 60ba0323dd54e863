use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Completed,
    AlreadyRunning,
    EmptyRepository,
    FetchFailed(String),
    ClearFailed(String),
}

/// Result of one sync run. Item-level failures are listed here instead of
/// being raised.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SyncOutcome {
    pub status: RunStatus,
    pub created_folders: usize,
    pub created_files: usize,
    pub failed_folders: Vec<String>,
    pub failed_files: Vec<String>,
    /// Files created with empty content because their body could not be fetched.
    pub degraded_files: Vec<String>,
    pub skipped_entries: usize,
    pub total_files: usize,
}

impl SyncOutcome {
    pub fn aborted(status: RunStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Lenient: anything visible was produced.
    pub fn succeeded(&self) -> bool {
        self.created_folders + self.created_files > 0
    }

    pub fn fully_succeeded(&self) -> bool {
        self.status == RunStatus::Completed
            && self.failed_folders.is_empty()
            && self.failed_files.is_empty()
            && self.degraded_files.is_empty()
    }

    pub fn failed_paths(&self) -> impl Iterator<Item = &str> {
        self.failed_folders
            .iter()
            .chain(self.failed_files.iter())
            .map(String::as_str)
    }

    pub fn error_count(&self) -> usize {
        self.failed_folders.len() + self.failed_files.len()
    }

    pub fn error_message(&self) -> Option<String> {
        match &self.status {
            RunStatus::Completed => None,
            RunStatus::AlreadyRunning => Some("a sync is already in progress".to_string()),
            RunStatus::EmptyRepository => Some("repository is empty".to_string()),
            RunStatus::FetchFailed(message) => {
                Some(format!("failed to fetch repository: {message}"))
            }
            RunStatus::ClearFailed(message) => {
                Some(format!("failed to clear workspace: {message}"))
            }
        }
    }

    pub fn summary(&self) -> String {
        if let Some(message) = self.error_message() {
            return message;
        }
        format!(
            "imported {} files and {} folders, {} errors",
            self.created_files,
            self.created_folders,
            self.error_count()
        )
    }
}
