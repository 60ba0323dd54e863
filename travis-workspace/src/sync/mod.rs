pub mod executor;
pub mod guard;
pub mod outcome;
pub mod paths;
pub mod planner;
pub mod progress;
pub mod retry;
pub mod source;

pub use executor::{ContentFailurePolicy, SyncExecutor};
pub use guard::{SyncRejected, SyncSessionGuard};
pub use outcome::{RunStatus, SyncOutcome};
pub use planner::{SyncPlan, SyncPlanner};
pub use progress::{ProgressCallback, SyncPhase, SyncProgress};
pub use retry::RetryPolicy;
pub use source::{RepoSource, SourceError, SyncTarget};
