use std::time::Duration;

use crate::batch::BatchOptions;
use crate::error::AppError;
use crate::throttle::RateLimiter;

/// Process-level knobs for a discovery run.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryConfig {
    pub max_workers: usize,
    pub max_jobs_per_listing: usize,
    pub max_pages: usize,
    pub browser_calls_per_minute: usize,
    pub url_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            max_jobs_per_listing: 30,
            max_pages: 2,
            browser_calls_per_minute: 30,
            url_timeout: Duration::from_secs(120),
        }
    }
}

impl DiscoveryConfig {
    /// Read configuration from environment variables.
    ///
    /// - `JOBSCOUT_MAX_WORKERS` (optional, defaults to 3)
    /// - `JOBSCOUT_MAX_JOBS_PER_LISTING` (optional, defaults to 30)
    /// - `JOBSCOUT_MAX_PAGES` (optional, defaults to 2)
    /// - `JOBSCOUT_BROWSER_CALLS_PER_MINUTE` (optional, defaults to 30)
    /// - `JOBSCOUT_URL_TIMEOUT_SECS` (optional, defaults to 120)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`DiscoveryConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |name: &str, default: usize| -> Result<usize, AppError> {
            match lookup(name) {
                None => Ok(default),
                Some(raw) => parse_positive(name, &raw),
            }
        };

        Ok(Self {
            max_workers: read("JOBSCOUT_MAX_WORKERS", defaults.max_workers)?,
            max_jobs_per_listing: read(
                "JOBSCOUT_MAX_JOBS_PER_LISTING",
                defaults.max_jobs_per_listing,
            )?,
            max_pages: read("JOBSCOUT_MAX_PAGES", defaults.max_pages)?,
            browser_calls_per_minute: read(
                "JOBSCOUT_BROWSER_CALLS_PER_MINUTE",
                defaults.browser_calls_per_minute,
            )?,
            url_timeout: Duration::from_secs(read(
                "JOBSCOUT_URL_TIMEOUT_SECS",
                defaults.url_timeout.as_secs() as usize,
            )? as u64),
        })
    }

    /// Batch options derived from this configuration, with validation on.
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            max_jobs_per_listing: self.max_jobs_per_listing,
            max_workers: self.max_workers,
            validate_jobs: true,
            max_pages: self.max_pages,
            url_timeout: self.url_timeout,
        }
    }

    /// A limiter allowing `browser_calls_per_minute` page sessions per minute.
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.browser_calls_per_minute, Duration::from_secs(60))
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<usize, AppError> {
    let parsed: usize = raw.trim().parse().map_err(|_| {
        AppError::ConfigError(format!(
            "Invalid {name} '{raw}': must be a positive integer"
        ))
    })?;
    if parsed == 0 {
        return Err(AppError::ConfigError(format!("{name} must be at least 1")));
    }
    Ok(parsed)
}
