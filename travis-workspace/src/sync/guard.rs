use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use super::outcome::SyncOutcome;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);
pub const DEFAULT_TRAILING_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyncRejected {
    #[error("a sync is already in progress")]
    InProgress,
    #[error("please wait {}s before syncing again", whole_seconds(.remaining))]
    Cooldown { remaining: Duration },
}

#[derive(Debug, Default)]
struct GuardState {
    in_flight: bool,
    last_attempt: Option<Instant>,
    last_outcome: Option<SyncOutcome>,
}

/// Rate limits and serializes user-triggered sync requests.
///
/// A request is rejected while another one is in flight, or when it comes
/// within `cooldown` of the previous accepted attempt. Rejected requests do
/// not run their task.
#[derive(Debug)]
pub struct SyncSessionGuard {
    cooldown: Duration,
    trailing_delay: Duration,
    state: Mutex<GuardState>,
}

impl Default for SyncSessionGuard {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN, DEFAULT_TRAILING_DELAY)
    }
}

impl SyncSessionGuard {
    pub fn new(cooldown: Duration, trailing_delay: Duration) -> Self {
        Self {
            cooldown,
            trailing_delay,
            state: Mutex::new(GuardState::default()),
        }
    }

    pub async fn request_sync<F, Fut>(&self, task: F) -> Result<SyncOutcome, SyncRejected>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncOutcome>,
    {
        let flight = self.begin()?;
        let outcome = task().await;
        self.lock().last_outcome = Some(outcome.clone());
        if !self.trailing_delay.is_zero() {
            tokio::time::sleep(self.trailing_delay).await;
        }
        drop(flight);
        Ok(outcome)
    }

    pub fn is_in_flight(&self) -> bool {
        self.lock().in_flight
    }

    pub fn last_outcome(&self) -> Option<SyncOutcome> {
        self.lock().last_outcome.clone()
    }

    pub fn reset_sync_state(&self) {
        self.lock().last_outcome = None;
    }

    /// Time left before a new request is accepted, if any.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let state = self.lock();
        self.remaining(&state, Instant::now())
    }

    fn begin(&self) -> Result<InFlight<'_>, SyncRejected> {
        let mut state = self.lock();
        if state.in_flight {
            tracing::info!("sync request rejected: already in progress");
            return Err(SyncRejected::InProgress);
        }
        let now = Instant::now();
        if let Some(remaining) = self.remaining(&state, now) {
            tracing::info!(
                remaining_ms = remaining.as_millis() as u64,
                "sync request rejected: cooldown"
            );
            return Err(SyncRejected::Cooldown { remaining });
        }
        state.in_flight = true;
        state.last_attempt = Some(now);
        Ok(InFlight { guard: self })
    }

    fn remaining(&self, state: &GuardState, now: Instant) -> Option<Duration> {
        let last = state.last_attempt?;
        let remaining = self.cooldown.saturating_sub(now.saturating_duration_since(last));
        (!remaining.is_zero()).then_some(remaining)
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-flight flag when the request finishes or is dropped.
struct InFlight<'a> {
    guard: &'a SyncSessionGuard,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.guard.lock().in_flight = false;
    }
}

fn whole_seconds(duration: &Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 { secs + 1 } else { secs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::outcome::RunStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn completed(files: usize) -> SyncOutcome {
        SyncOutcome {
            created_files: files,
            total_files: files,
            ..SyncOutcome::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_requests_run_once() {
        let guard = SyncSessionGuard::default();
        let counter = AtomicUsize::new(0);
        let runs = &counter;
        let task = || async move {
            runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            completed(1)
        };

        let (first, second) = tokio::join!(guard.request_sync(task), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            assert!(guard.is_in_flight());
            guard.request_sync(task).await
        });

        assert_eq!(first.unwrap().created_files, 1);
        assert_eq!(second.unwrap_err(), SyncRejected::InProgress);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!guard.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_rejects_until_window_passes() {
        let guard = SyncSessionGuard::new(Duration::from_secs(10), Duration::ZERO);
        guard.request_sync(|| async { completed(1) }).await.unwrap();

        let rejected = guard.request_sync(|| async { completed(2) }).await;
        assert!(matches!(rejected, Err(SyncRejected::Cooldown { .. })));
        assert_eq!(
            rejected.unwrap_err().to_string(),
            "please wait 10s before syncing again"
        );

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(guard.cooldown_remaining(), Some(Duration::from_secs(6)));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(guard.cooldown_remaining(), None);
        let outcome = guard.request_sync(|| async { completed(2) }).await.unwrap();
        assert_eq!(outcome.created_files, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_clears_after_trailing_delay() {
        let guard = SyncSessionGuard::new(Duration::ZERO, Duration::from_millis(300));
        let started = Instant::now();

        guard.request_sync(|| async { completed(1) }).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(!guard.is_in_flight());
        assert!(guard.request_sync(|| async { completed(1) }).await.is_ok());
    }

    #[tokio::test]
    async fn last_outcome_is_kept_until_reset() {
        let guard = SyncSessionGuard::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(guard.last_outcome(), None);

        guard
            .request_sync(|| async { SyncOutcome::aborted(RunStatus::EmptyRepository) })
            .await
            .unwrap();
        assert_eq!(
            guard.last_outcome().map(|outcome| outcome.status),
            Some(RunStatus::EmptyRepository)
        );

        guard.reset_sync_state();
        assert_eq!(guard.last_outcome(), None);
    }

    #[tokio::test]
    async fn abandoned_request_releases_flight() {
        let guard = SyncSessionGuard::new(Duration::ZERO, Duration::ZERO);
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            guard.request_sync(std::future::pending::<SyncOutcome>),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(!guard.is_in_flight());
    }

    #[test]
    fn cooldown_message_rounds_up() {
        let rejected = SyncRejected::Cooldown {
            remaining: Duration::from_millis(2500),
        };
        assert_eq!(rejected.to_string(), "please wait 3s before syncing again");
        assert_eq!(
            SyncRejected::InProgress.to_string(),
            "a sync is already in progress"
        );
    }
}
