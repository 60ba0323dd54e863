use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Fetching,
    Planning,
    CreatingFolders,
    CreatingFiles,
    Reporting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncProgress {
    Phase {
        phase: SyncPhase,
    },
    Planned {
        folders: usize,
        files: usize,
        skipped: usize,
    },
    FolderCreated {
        path: String,
    },
    FolderFailed {
        path: String,
        error: String,
    },
    FileCreated {
        path: String,
    },
    FileFailed {
        path: String,
        error: String,
    },
}

/// Callback for progress updates during a sync run.
pub type ProgressCallback = Arc<dyn Fn(SyncProgress) + Send + Sync>;

pub(crate) fn emit(callback: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(callback) = callback {
        callback(event);
    }
}
