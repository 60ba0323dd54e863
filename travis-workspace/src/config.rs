use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::sync::guard::SyncSessionGuard;
use crate::sync::planner::{DEFAULT_SENTINELS, SyncPlanner};
use crate::sync::retry::{DEFAULT_ATTEMPTS, RetryPolicy};
use crate::sync::ContentFailurePolicy;

const DEFAULT_COOLDOWN_SECS: u64 = 10;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;
const DEFAULT_TRAILING_DELAY_MS: u64 = 300;

#[derive(Clone, Debug)]
pub struct WorkspaceConfig {
    pub github_token: String,
    pub github_api_url: Option<String>,
    pub db_path: Option<PathBuf>,
    pub cooldown: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub trailing_delay: Duration,
    pub sentinels: Vec<String>,
    pub placeholder_on_fetch_error: bool,
}

impl WorkspaceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let github_token = lookup("GITHUB_TOKEN")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .context("GITHUB_TOKEN is not set")?;
        let github_api_url = lookup("TRAVIS_GITHUB_API_URL").filter(|value| !value.is_empty());
        let db_path = lookup("TRAVIS_DB_PATH")
            .filter(|value| !value.is_empty())
            .map(|value| expand_path(&value))
            .transpose()?;
        let cooldown = Duration::from_secs(read_u64_or_zero(
            &lookup,
            "TRAVIS_SYNC_COOLDOWN_SECS",
            DEFAULT_COOLDOWN_SECS,
        ));
        let retry_attempts = u32::try_from(read_u64(
            &lookup,
            "TRAVIS_SYNC_RETRY_ATTEMPTS",
            u64::from(DEFAULT_ATTEMPTS),
        ))
        .unwrap_or(DEFAULT_ATTEMPTS);
        let retry_delay = Duration::from_millis(read_u64(
            &lookup,
            "TRAVIS_SYNC_RETRY_DELAY_MS",
            DEFAULT_RETRY_DELAY_MS,
        ));
        let trailing_delay = Duration::from_millis(read_u64_or_zero(
            &lookup,
            "TRAVIS_SYNC_TRAILING_DELAY_MS",
            DEFAULT_TRAILING_DELAY_MS,
        ));
        let sentinels = lookup("TRAVIS_SYNC_SENTINELS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|| DEFAULT_SENTINELS.iter().map(|s| s.to_string()).collect());
        let placeholder_on_fetch_error =
            read_bool(&lookup, "TRAVIS_SYNC_PLACEHOLDER_ON_FETCH_ERROR", false);

        Ok(Self {
            github_token,
            github_api_url,
            db_path,
            cooldown,
            retry_attempts,
            retry_delay,
            trailing_delay,
            sentinels,
            placeholder_on_fetch_error,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.retry_attempts, self.retry_delay)
    }

    pub fn planner(&self) -> SyncPlanner {
        SyncPlanner::with_sentinels(self.sentinels.iter().cloned())
    }

    pub fn content_policy(&self) -> ContentFailurePolicy {
        if self.placeholder_on_fetch_error {
            ContentFailurePolicy::Placeholder
        } else {
            ContentFailurePolicy::Skip
        }
    }

    pub fn session_guard(&self) -> SyncSessionGuard {
        SyncSessionGuard::new(self.cooldown, self.trailing_delay)
    }
}

fn expand_path(value: &str) -> anyhow::Result<PathBuf> {
    if !value.starts_with('~') {
        return Ok(PathBuf::from(value));
    }
    let home = dirs::home_dir().context("home directory is unavailable")?;
    Ok(expand_with_home(value, &home))
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

// Zero and unparsable values fall back to the default.
fn read_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

// Like `read_u64`, but 0 is kept so the optional waits can be switched off.
fn read_u64_or_zero<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn read_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}
