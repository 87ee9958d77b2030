//! # Retry policies for the convenience emitters
//!
//! `ManySink::emit_next` and friends loop over the non-blocking `try_emit_*`
//! primitives and ask an [`EmitFailureHandler`] what to do after each
//! retriable failure. Handlers are stateless: everything they need is in the
//! [`EmitFailure`] describing the attempt.
//!
//! [`Backoff`] computes `first × factor^attempt`, clamped to `max`. The base
//! delay depends only on the attempt number.

use std::time::Duration;

use crate::EmitResult;

/// Description of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitFailure {
    /// Result of the failed `try_emit_*` call
    pub result: EmitResult,
    /// 1-based attempt number
    pub attempt: u32,
    /// Time since the first attempt
    pub elapsed: Duration,
}

/// What the emitter should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryNow,
    RetryAfter(Duration),
    Abort,
}

/// Caller-supplied retry policy
pub trait EmitFailureHandler: Send + Sync {
    fn on_emit_failure(&self, failure: &EmitFailure) -> RetryDecision;
}

impl<F> EmitFailureHandler for F
where
    F: Fn(&EmitFailure) -> RetryDecision + Send + Sync,
{
    fn on_emit_failure(&self, failure: &EmitFailure) -> RetryDecision {
        self(failure)
    }
}

/// Never retry
#[derive(Debug, Clone, Copy, Default)]
pub struct FailFast;

impl EmitFailureHandler for FailFast {
    fn on_emit_failure(&self, _failure: &EmitFailure) -> RetryDecision {
        RetryDecision::Abort
    }
}

/// Spin on `FailNonSerialized` until `max` has elapsed; abort anything else
#[derive(Debug, Clone, Copy)]
pub struct BusyLooping {
    max: Duration,
}

impl BusyLooping {
    pub fn new(max: Duration) -> Self {
        Self { max }
    }
}

impl EmitFailureHandler for BusyLooping {
    fn on_emit_failure(&self, failure: &EmitFailure) -> RetryDecision {
        if failure.result == EmitResult::FailNonSerialized && failure.elapsed < self.max {
            RetryDecision::RetryNow
        } else {
            RetryDecision::Abort
        }
    }
}

/// Exponential backoff for contention and overflow
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    /// Delay before the first retry
    pub first: Duration,
    /// Upper bound for any single delay
    pub max: Duration,
    /// Growth factor (`>= 1.0` recommended)
    pub factor: f64,
    /// Give up after this many attempts
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            first: Duration::from_micros(50),
            max: Duration::from_millis(10),
            factor: 2.0,
            max_attempts: 16,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

impl EmitFailureHandler for Backoff {
    fn on_emit_failure(&self, failure: &EmitFailure) -> RetryDecision {
        match failure.result {
            EmitResult::FailNonSerialized | EmitResult::FailOverflow
                if failure.attempt < self.max_attempts =>
            {
                RetryDecision::RetryAfter(self.delay(failure.attempt))
            }
            _ => RetryDecision::Abort,
        }
    }
}
