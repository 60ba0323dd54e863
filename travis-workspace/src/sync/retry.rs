use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential { max: Duration, jitter: bool },
}

/// Bounded retry for item-level store operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_ATTEMPTS, DEFAULT_DELAY)
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration, max: Duration, jitter: bool) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: base,
            backoff: Backoff::Exponential { max, jitter },
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the failed attempt `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(attempt, &mut rng)
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max, jitter } => {
                let base_ms = self.delay.as_millis().min(u128::from(u64::MAX)) as u64;
                let max_ms = max.as_millis().min(u128::from(u64::MAX)) as u64;
                let shift = attempt.min(16);
                let exp = base_ms.saturating_mul(1u64 << shift).min(max_ms);
                let delay_ms = if jitter { rng.gen_range(0..=exp) } else { exp };
                Duration::from_millis(delay_ms)
            }
        }
    }

    pub async fn run<T, E, F, Fut>(&self, label: &str, op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_until(label, op, |_| false).await
    }

    /// Like [`RetryPolicy::run`], but gives up immediately on errors for which
    /// `is_final` returns true.
    pub async fn run_until<T, E, F, Fut, P>(
        &self,
        label: &str,
        mut op: F,
        is_final: P,
    ) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if is_final(&err) || attempt >= self.max_attempts {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt - 1);
                    tracing::warn!(
                        target: "travis_workspace::retry",
                        %label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
