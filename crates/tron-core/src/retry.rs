//! Retry configuration and backoff calculation.
//!
//! Only the portable math lives here. Callers own the sleeping: the event
//! store retries synchronously around `SQLite`, the worktree layer retries
//! asynchronously around git.
//!
//! - [`RetryConfig`]: retry parameters (max retries, backoff, jitter)
//! - [`calculate_backoff_delay_with_random`]: exponential backoff with jitter
//! - [`calculate_linear_delay_with_random`]: capped linear backoff with jitter

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default maximum retries.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 100;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 2_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Configuration for retry logic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff in ms.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between retries in ms.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryConfig {
    /// Config with `max_retries` and the default timing.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (zero-based) for a given random draw.
    #[must_use]
    pub fn delay_ms(&self, attempt: u32, random: f64) -> u64 {
        calculate_backoff_delay_with_random(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            random,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Exponential backoff delay with jitter.
///
/// Formula: `min(max_delay, base_delay * 2^attempt) * (1 + (2r - 1) * jitter)`
/// where `random` (r) is a value in `[0.0, 1.0]`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);
    apply_jitter(capped, jitter_factor, random)
}

/// Linear backoff delay with jitter: `min(attempt * step, max) ± jitter`.
///
/// Used for lock contention where waits should grow slowly and stay short.
#[must_use]
pub fn calculate_linear_delay_with_random(
    attempt: u32,
    step_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let linear = step_ms.saturating_mul(u64::from(attempt)).min(max_delay_ms);
    apply_jitter(linear, jitter_factor, random)
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn apply_jitter(delay_ms: u64, jitter_factor: f64, random: f64) -> u64 {
    let jitter = 1.0 + (random.clamp(0.0, 1.0) * 2.0 - 1.0) * jitter_factor;
    ((delay_ms as f64) * jitter).round().max(0.0) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // -- RetryConfig --

    #[test]
    fn retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.base_delay_ms, 100);
        assert_eq!(config.max_delay_ms, 2_000);
        assert!((config.jitter_factor - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn retry_config_serde_defaults() {
        let config: RetryConfig = serde_json::from_str(r#"{"maxRetries": 7}"#).unwrap();
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.base_delay_ms, 100);
    }

    #[test]
    fn with_max_retries_keeps_timing() {
        let config = RetryConfig::with_max_retries(4);
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.max_delay_ms, DEFAULT_MAX_DELAY_MS);
    }

    // -- exponential --

    #[test]
    fn backoff_exponential_growth() {
        let d: Vec<u64> = (0..4)
            .map(|a| calculate_backoff_delay_with_random(a, 1000, 60_000, 0.0, 0.5))
            .collect();
        assert_eq!(d, vec![1000, 2000, 4000, 8000]);
    }

    #[test]
    fn backoff_jitter_bounds() {
        assert_eq!(calculate_backoff_delay_with_random(0, 1000, 60_000, 0.2, 0.0), 800);
        assert_eq!(calculate_backoff_delay_with_random(0, 1000, 60_000, 0.2, 0.5), 1000);
        assert_eq!(calculate_backoff_delay_with_random(0, 1000, 60_000, 0.2, 1.0), 1200);
    }

    #[test]
    fn backoff_caps_at_max() {
        assert_eq!(calculate_backoff_delay_with_random(20, 1000, 60_000, 0.2, 0.5), 60_000);
    }

    // -- linear --

    #[test]
    fn linear_grows_then_caps() {
        assert_eq!(calculate_linear_delay_with_random(1, 10, 500, 0.0, 0.5), 10);
        assert_eq!(calculate_linear_delay_with_random(5, 10, 500, 0.0, 0.5), 50);
        assert_eq!(calculate_linear_delay_with_random(99, 10, 500, 0.0, 0.5), 500);
    }

    #[test]
    fn linear_zero_attempt_is_zero() {
        assert_eq!(calculate_linear_delay_with_random(0, 10, 500, 0.25, 1.0), 0);
    }

    proptest! {
        #[test]
        fn backoff_never_exceeds_jittered_cap(
            attempt in 0u32..200,
            random in 0.0f64..=1.0,
        ) {
            let delay = calculate_backoff_delay_with_random(attempt, 100, 2_000, 0.2, random);
            prop_assert!(delay <= 2_400);
        }
    }
}
