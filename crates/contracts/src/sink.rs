//! ManySink trait - producer handle interface
//!
//! Every flavor and the serialization guard implement this trait. All
//! `try_emit_*` operations are non-blocking and return immediately.

use std::sync::Arc;
use std::time::Instant;

use crate::{
    Context, EmissionError, EmitFailure, EmitFailureHandler, EmitResult, HotStream, RetryDecision,
    Scannable, SignalError,
};

/// Shared, type-erased producer handle
pub type Many<T> = Arc<dyn ManySink<T>>;

/// Producer-side handle of a hot stream
pub trait ManySink<T>: Scannable + Send + Sync {
    /// Try to hand `value` to the stream
    fn try_emit_next(&self, value: T) -> EmitResult;

    /// Try to terminate the stream successfully
    fn try_emit_complete(&self) -> EmitResult;

    /// Try to terminate the stream with `error`
    fn try_emit_error(&self, error: SignalError) -> EmitResult;

    /// Snapshot of attached subscribers; may be stale on return
    fn current_subscriber_count(&self) -> usize;

    /// Read side of this sink
    fn as_stream(&self) -> HotStream<T>;

    /// Context of the current subscriber, empty if none
    fn current_context(&self) -> Context {
        Context::empty()
    }

    /// Emit `value`, retrying retriable failures as `handler` decides
    ///
    /// A value that could not be delivered is passed to the context's
    /// discard hook before the error is returned.
    fn emit_next(&self, value: T, handler: &dyn EmitFailureHandler) -> Result<(), EmissionError>
    where
        T: Clone + 'static,
    {
        let outcome = retry_loop(handler, || self.try_emit_next(value.clone()));
        if outcome.is_err() {
            self.current_context().discard(&value);
        }
        outcome
    }

    /// Complete, retrying retriable failures as `handler` decides
    fn emit_complete(&self, handler: &dyn EmitFailureHandler) -> Result<(), EmissionError> {
        retry_loop(handler, || self.try_emit_complete())
    }

    /// Error, retrying retriable failures as `handler` decides
    fn emit_error(
        &self,
        error: SignalError,
        handler: &dyn EmitFailureHandler,
    ) -> Result<(), EmissionError> {
        retry_loop(handler, || self.try_emit_error(Arc::clone(&error)))
    }
}

/// Drive `attempt` until it succeeds, fails terminally, or the handler aborts
fn retry_loop(
    handler: &dyn EmitFailureHandler,
    mut attempt: impl FnMut() -> EmitResult,
) -> Result<(), EmissionError> {
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        attempts = attempts.saturating_add(1);
        let result = attempt();
        if result.is_success() {
            return Ok(());
        }
        if result.is_terminal_failure() {
            return Err(EmissionError::new(result, attempts));
        }

        let failure = EmitFailure {
            result,
            attempt: attempts,
            elapsed: started.elapsed(),
        };
        match handler.on_emit_failure(&failure) {
            RetryDecision::RetryNow => std::hint::spin_loop(),
            RetryDecision::RetryAfter(delay) => std::thread::sleep(delay),
            RetryDecision::Abort => return Err(EmissionError::new(result, attempts)),
        }
    }
}
