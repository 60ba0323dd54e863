mod client;
mod types;

pub use client::{ApiErrorClass, GithubClient, GithubError, split_full_name};
pub use types::{
    Branch, BranchCommit, ContentItem, ContentType, EntryKind, Owner, Repo, RepoEntry,
};
