pub mod config;
pub mod import;
pub mod publish;
pub mod store;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::WorkspaceConfig;
pub use import::WorkspaceImporter;
pub use publish::{PublishOutcome, WorkspacePublisher};
pub use store::{FileStore, StoreError, WorkspaceStore};
