use thiserror::Error;

pub const ROOT: &str = "/";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("repository path is empty")]
    Empty,
    #[error("repository path contains unsupported component: {0}")]
    UnsupportedComponent(String),
}

/// Normalizes a repository-relative path (`src/a.rs`): strips surrounding
/// slashes and rejects empty, `.` and `..` segments.
pub fn normalize_repo_path(path: &str) -> Result<String, PathError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(PathError::Empty);
    }
    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(PathError::UnsupportedComponent(path.to_string()));
        }
    }
    Ok(trimmed.to_string())
}

/// Maps a normalized repository path onto the workspace namespace
/// (`src/a.rs` -> `/src/a.rs`).
pub fn local_path_for(repo_path: &str) -> String {
    format!("/{}", repo_path.trim_matches('/'))
}

pub fn parent_of(local_path: &str) -> String {
    match local_path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) | None => ROOT.to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

pub fn name_of(local_path: &str) -> &str {
    let trimmed = local_path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT {
        format!("/{name}")
    } else {
        format!("{}/{name}", parent.trim_end_matches('/'))
    }
}

pub fn depth(repo_path: &str) -> usize {
    repo_path.matches('/').count()
}

/// Proper ancestors of a repository path, shallowest first
/// (`a/b/c.rs` -> `["a", "a/b"]`).
pub fn repo_ancestors(repo_path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut end = 0;
    while let Some(offset) = repo_path[end..].find('/') {
        end += offset;
        out.push(repo_path[..end].to_string());
        end += 1;
    }
    out
}

/// Walks up from `local_path` (inclusive) until `exists` returns true and
/// returns the missing directories shallowest first.
pub fn missing_ancestors(local_path: &str, exists: impl Fn(&str) -> bool) -> Vec<String> {
    let mut missing = Vec::new();
    let mut current = local_path.to_string();
    while current != ROOT && !exists(&current) {
        let parent = parent_of(&current);
        missing.push(current);
        current = parent;
    }
    missing.reverse();
    missing
}
