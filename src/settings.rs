//! Run Configuration
//!
//! Plain configuration records consumed by the engine. Binding them from
//! files or the environment is left to the embedding application; the serde
//! derives only make that possible.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of attempts the recovery runner gives a failing step.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between recovery attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Upper bound for exponential backoff.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Engine-wide settings for a single workflow run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ForgeSettings {
    /// Run every step and report an aggregate instead of failing fast.
    pub continue_on_error: bool,

    /// Default bound for for-each fan-out when the operation sets none.
    pub max_concurrency: usize,

    /// Per-operation timeout installed by [`crate::Smith::from_settings`].
    pub operation_timeout: Option<Duration>,

    /// Retry policy used by the recovery runner.
    pub recovery: RecoveryPolicy,
}

impl Default for ForgeSettings {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            max_concurrency: num_cpus::get(),
            operation_timeout: None,
            recovery: RecoveryPolicy::default(),
        }
    }
}

impl ForgeSettings {
    /// Enables or disables continue-on-error mode.
    pub fn with_continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    /// Sets the default for-each concurrency bound (clamped to at least one).
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Sets the per-operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Replaces the recovery policy.
    pub fn with_recovery(mut self, policy: RecoveryPolicy) -> Self {
        self.recovery = policy;
        self
    }
}

/// How the delay between recovery attempts grows.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Every attempt waits `base_delay`.
    Fixed,
    /// Attempt `n` waits `base_delay * 2^(n-1)`, capped at `max_delay`.
    Exponential,
}

/// Retry policy for resuming a failed run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RecoveryPolicy {
    /// Total attempts allowed for the first incomplete step.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Growth strategy for later attempts.
    pub backoff: Backoff,
    /// Cap applied to exponential growth.
    pub max_delay: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            backoff: Backoff::Exponential,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RecoveryPolicy {
    /// Creates a policy with the given attempt budget and base delay.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Sets the backoff strategy.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the exponential backoff cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let exponent = attempt.saturating_sub(1).min(31);
                let factor = 1u32 << exponent;
                self.base_delay
                    .checked_mul(factor)
                    .unwrap_or(self.max_delay)
                    .min(self.max_delay)
            }
        }
    }
}
