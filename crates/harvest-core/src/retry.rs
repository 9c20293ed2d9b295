//! Retry with exponential backoff for remote calls.
//!
//! [`Backoff`] wraps an async operation and retries it while the error is
//! transient ([`IsRetryable`]) and the give-up predicate does not match.
//! Backoff can be switched off entirely, in which case the operation runs
//! exactly once.
//!
//! # Example
//!
//! ```no_run
//! use harvest_core::{Backoff, HarvestError, RetryConfig};
//!
//! # async fn example() -> harvest_core::Result<()> {
//! let backoff = Backoff::new(RetryConfig::enabled()).give_up_on_statuses(&[404, 500]);
//! let body = backoff
//!     .run(move || async move { Ok::<_, HarvestError>("payload".to_string()) })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::duration_millis;
use crate::error::{HarvestError, Result};

/// Classifies errors as transient or permanent.
pub trait IsRetryable {
    /// Returns true if the failed operation may succeed when tried again.
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for HarvestError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

/// Backoff settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Whether failed calls are retried at all.
    #[serde(default)]
    pub enabled: bool,

    /// Total attempts including the first one.
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,

    /// Delay before the first retry.
    #[serde(default = "default_initial_delay", with = "duration_millis")]
    pub initial_delay: Duration,

    /// Upper bound for any single delay.
    #[serde(default = "default_max_delay", with = "duration_millis")]
    pub max_delay: Duration,

    /// Factor applied to the delay after each retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Randomize each delay between 1x and 2x.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

const fn default_max_tries() -> u32 {
    8
}

const fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

const fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_tries: default_max_tries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// Default settings with backoff switched on.
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }
}

/// Predicate deciding that an error is final even if it looks transient.
pub type GiveUp = Arc<dyn Fn(&HarvestError) -> bool + Send + Sync>;

/// Retry strategy for remote calls.
#[derive(Clone)]
pub struct Backoff {
    config: RetryConfig,
    give_up: GiveUp,
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backoff")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl Backoff {
    /// Creates a backoff that gives up immediately on HTTP 404.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            give_up: Arc::new(|e: &HarvestError| e.status() == Some(404)),
        }
    }

    /// A backoff that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Replaces the give-up predicate.
    #[must_use]
    pub fn with_give_up<F>(mut self, give_up: F) -> Self
    where
        F: Fn(&HarvestError) -> bool + Send + Sync + 'static,
    {
        self.give_up = Arc::new(give_up);
        self
    }

    /// Gives up immediately when the error carries one of these HTTP statuses.
    #[must_use]
    pub fn give_up_on_statuses(self, statuses: &[u16]) -> Self {
        let statuses = statuses.to_vec();
        self.with_give_up(move |e| e.status().is_some_and(|s| statuses.contains(&s)))
    }

    /// Turns retrying on or off, keeping the other settings.
    #[must_use]
    pub fn toggled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Returns true if failed calls are retried.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Returns the backoff settings.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation`, retrying transient failures with exponential delays.
    ///
    /// Returns the first success, or the last error once attempts are
    /// exhausted, the error is permanent, or the give-up predicate matches.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 1;
        let mut delay = self.config.initial_delay;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(attempts = attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if self.should_retry(&e, attempt) => {
                    let wait = match &e {
                        HarvestError::RateLimited {
                            retry_after: Some(after),
                        } => (*after).min(self.config.max_delay),
                        _ if self.config.jitter => add_jitter(delay),
                        _ => delay,
                    };

                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_tries = self.config.max_tries,
                        delay_ms = wait.as_millis() as u64,
                        "Call failed, backing off"
                    );

                    tokio::time::sleep(wait).await;

                    attempt += 1;
                    delay = Duration::from_secs_f64(delay.as_secs_f64() * self.config.multiplier)
                        .min(self.config.max_delay);
                }
                Err(e) => {
                    if self.config.enabled && attempt > 1 {
                        tracing::error!(error = %e, attempts = attempt, "Giving up after retries");
                    }
                    return Err(e);
                }
            }
        }
    }

    fn should_retry(&self, error: &HarvestError, attempt: u32) -> bool {
        self.config.enabled
            && attempt < self.config.max_tries
            && error.is_retryable()
            && !(self.give_up)(error)
    }
}

/// Scales a delay by a random factor in `[1, 2]`.
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
