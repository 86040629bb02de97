//! Retry policies bounding a polling loop.

use crate::errors::PolicyError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay between consecutive probe attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelayStrategy {
    /// delay = `delay_ms`
    Fixed {
        /// Delay in milliseconds.
        delay_ms: u64,
    },
    /// delay = base * (retry + 1), capped
    Linear {
        /// Base delay in milliseconds.
        base_delay_ms: u64,
        /// Cap in milliseconds.
        max_delay_ms: u64,
    },
    /// delay = base * 2^retry, capped
    Exponential {
        /// Base delay in milliseconds.
        base_delay_ms: u64,
        /// Cap in milliseconds.
        max_delay_ms: u64,
    },
}

impl Default for DelayStrategy {
    fn default() -> Self {
        Self::Fixed {
            delay_ms: DEFAULT_DELAY_MS,
        }
    }
}

impl DelayStrategy {
    /// Base delay before jitter for the retry following attempt `retry + 1`.
    #[must_use]
    pub fn base_delay(&self, retry: u32) -> Duration {
        let ms = match *self {
            Self::Fixed { delay_ms } => delay_ms,
            Self::Linear {
                base_delay_ms,
                max_delay_ms,
            } => base_delay_ms
                .saturating_mul(u64::from(retry) + 1)
                .min(max_delay_ms),
            Self::Exponential {
                base_delay_ms,
                max_delay_ms,
            } => base_delay_ms
                .saturating_mul(2u64.saturating_pow(retry))
                .min(max_delay_ms),
        };
        Duration::from_millis(ms)
    }
}

/// Jitter applied on top of the delay strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

impl JitterStrategy {
    fn apply(self, delay: Duration) -> Duration {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let jittered = match self {
            Self::None => ms,
            Self::Full => {
                if ms == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=ms)
                }
            }
            Self::Equal => {
                let half = ms / 2;
                if half == 0 {
                    ms
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };
        Duration::from_millis(jittered)
    }
}

/// How probe failures classified as fatal are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalMode {
    /// Treat every failure as "not converged yet" and keep polling.
    #[default]
    RetryAll,
    /// Stop at the first fatal failure.
    AbortOnFatal,
}

pub(crate) const DEFAULT_DEADLINE_MS: u64 = 30_000;
pub(crate) const DEFAULT_DELAY_MS: u64 = 10;

fn default_deadline_ms() -> Option<u64> {
    Some(DEFAULT_DEADLINE_MS)
}

fn default_converge_after() -> u32 {
    1
}

/// Bounds and pacing for a convergence poll.
///
/// At least one of `deadline_ms` and `max_attempts` must be set. The first
/// probe attempt counts against `max_attempts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Wall-clock budget in milliseconds.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: Option<u64>,
    /// Maximum probe invocations.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Delay between attempts.
    #[serde(default)]
    pub delay: DelayStrategy,
    /// Jitter on top of `delay`.
    #[serde(default)]
    pub jitter: JitterStrategy,
    /// Consecutive successful observations required.
    #[serde(default = "default_converge_after")]
    pub converge_after: u32,
    /// Handling of fatal probe failures.
    #[serde(default)]
    pub fatal_mode: FatalMode,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline_ms(),
            max_attempts: None,
            delay: DelayStrategy::default(),
            jitter: JitterStrategy::None,
            converge_after: default_converge_after(),
            fatal_mode: FatalMode::RetryAll,
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy: 30s deadline, 10ms fixed delay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy bounded only by an attempt budget.
    #[must_use]
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            deadline_ms: None,
            max_attempts: Some(max_attempts),
            ..Self::default()
        }
    }

    /// A policy bounded only by a deadline.
    #[must_use]
    pub fn timeout(deadline: Duration) -> Self {
        Self::default().with_deadline(deadline)
    }

    /// Sets the deadline, rounded up to whole milliseconds.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        let ms = deadline.as_nanos().div_ceil(1_000_000);
        self.deadline_ms = Some(u64::try_from(ms).unwrap_or(u64::MAX));
        self
    }

    /// Removes the deadline.
    #[must_use]
    pub fn without_deadline(mut self) -> Self {
        self.deadline_ms = None;
        self
    }

    /// Sets the attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Sets the delay strategy.
    #[must_use]
    pub fn with_delay(mut self, delay: DelayStrategy) -> Self {
        self.delay = delay;
        self
    }

    /// Uses a fixed delay.
    #[must_use]
    pub fn with_fixed_delay(self, delay: Duration) -> Self {
        self.with_delay(DelayStrategy::Fixed {
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Requires `n` consecutive successful observations.
    #[must_use]
    pub fn with_converge_after(mut self, n: u32) -> Self {
        self.converge_after = n;
        self
    }

    /// Sets the fatal failure mode.
    #[must_use]
    pub fn with_fatal_mode(mut self, mode: FatalMode) -> Self {
        self.fatal_mode = mode;
        self
    }

    /// Returns the deadline as a duration.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// Checks that the policy bounds every loop it drives.
    pub fn validate(&self) -> Result<(), PolicyError> {
        match (self.deadline_ms, self.max_attempts) {
            (None, None) => return Err(PolicyError::Unbounded),
            (_, Some(0)) => return Err(PolicyError::ZeroAttempts),
            (Some(0), _) => return Err(PolicyError::ZeroDeadline),
            _ => {}
        }
        if self.converge_after == 0 {
            return Err(PolicyError::ZeroConvergeThreshold);
        }
        Ok(())
    }

    /// Delay to wait after the attempt numbered `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base = self.delay.base_delay(attempt.saturating_sub(1));
        self.jitter.apply(base)
    }
}
