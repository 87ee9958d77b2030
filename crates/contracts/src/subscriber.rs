//! Subscriber side contract - the minimum a sink needs from its consumers
//!
//! A subscriber receives signals synchronously on the producer's thread.
//! It is free to call back into the sink from inside `on_next`.

use std::fmt;
use std::sync::Arc;

use crate::{Context, SignalError};

/// Consumer of a hot stream
pub trait Subscriber<T>: Send + Sync {
    /// Next value; only called while the subscriber has outstanding demand
    fn on_next(&self, value: T);

    /// Successful end of the stream
    fn on_complete(&self) {}

    /// Failed end of the stream
    fn on_error(&self, error: SignalError) {
        let _ = error;
    }

    /// Ambient context exposed to the sink
    fn context(&self) -> Context {
        Context::empty()
    }
}

/// A signal as observed by a subscriber
#[derive(Clone)]
pub enum Signal<T> {
    Next(T),
    Complete,
    Error(SignalError),
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Next(v) => f.debug_tuple("Next").field(v).finish(),
            Signal::Complete => f.write_str("Complete"),
            Signal::Error(e) => f.debug_tuple("Error").field(&e.to_string()).finish(),
        }
    }
}

impl<T> Signal<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Signal::Next(_))
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Signal::Next(v) => Some(v),
            _ => None,
        }
    }
}

/// Demand channel from a subscriber back to its sink
pub trait Demand: Send + Sync {
    /// Add `n` to outstanding demand; `u64::MAX` means unbounded
    fn request(&self, n: u64);

    /// Detach from the sink; idempotent
    fn cancel(&self);

    fn is_cancelled(&self) -> bool;
}

/// Handle returned by `HotStream::subscribe`
///
/// Dropping the handle does not cancel the subscription.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<dyn Demand>,
}

impl Subscription {
    pub fn new(inner: Arc<dyn Demand>) -> Self {
        Self { inner }
    }

    /// A subscription that was never attached to anything
    pub fn detached() -> Self {
        Self::new(Arc::new(Detached))
    }

    pub fn request(&self, n: u64) {
        if n > 0 {
            self.inner.request(n);
        }
    }

    pub fn request_unbounded(&self) {
        self.inner.request(u64::MAX);
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct Detached;

impl Demand for Detached {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {}

    fn is_cancelled(&self) -> bool {
        true
    }
}

/// Source side of a hot stream, implemented by every flavor
pub trait Subscribe<T>: Send + Sync {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) -> Subscription;
}

/// Read side of a sink; the hot sequence subscribers attach to
pub struct HotStream<T> {
    source: Arc<dyn Subscribe<T>>,
}

impl<T> Clone for HotStream<T> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<T> HotStream<T> {
    pub fn new(source: Arc<dyn Subscribe<T>>) -> Self {
        Self { source }
    }

    /// Attach a subscriber with zero initial demand
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) -> Subscription {
        self.source.subscribe(subscriber)
    }

    /// Attach a subscriber and immediately request unbounded demand
    pub fn subscribe_unbounded(&self, subscriber: Arc<dyn Subscriber<T>>) -> Subscription {
        let subscription = self.subscribe(subscriber);
        subscription.request_unbounded();
        subscription
    }
}

type OnNext<T> = Box<dyn Fn(T) + Send + Sync>;
type OnComplete = Box<dyn Fn() + Send + Sync>;
type OnError = Box<dyn Fn(SignalError) + Send + Sync>;

/// Subscriber assembled from closures
pub struct FnSubscriber<T> {
    on_next: OnNext<T>,
    on_complete: Option<OnComplete>,
    on_error: Option<OnError>,
    context: Context,
}

impl<T> FnSubscriber<T> {
    pub fn new(on_next: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            on_next: Box::new(on_next),
            on_complete: None,
            on_error: None,
            context: Context::empty(),
        }
    }

    pub fn on_complete(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(SignalError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn shared(self) -> Arc<dyn Subscriber<T>>
    where
        T: 'static,
    {
        Arc::new(self)
    }
}

impl<T> Subscriber<T> for FnSubscriber<T> {
    fn on_next(&self, value: T) {
        (self.on_next)(value);
    }

    fn on_complete(&self) {
        if let Some(f) = &self.on_complete {
            f();
        }
    }

    fn on_error(&self, error: SignalError) {
        if let Some(f) = &self.on_error {
            f(error);
        }
    }

    fn context(&self) -> Context {
        self.context.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_detached_subscription_is_cancelled() {
        let sub = Subscription::detached();
        sub.request(10);
        assert!(sub.is_cancelled());
    }

    #[test]
    fn test_fn_subscriber_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (Arc::clone(&log), Arc::clone(&log));
        let sub = FnSubscriber::new(move |v: u32| a.lock().unwrap().push(format!("next {v}")))
            .on_complete(move || b.lock().unwrap().push("complete".to_string()));

        sub.on_next(1);
        Subscriber::on_error(&sub, crate::ContractError::Other("ignored".into()).into_signal());
        Subscriber::on_complete(&sub);

        assert_eq!(*log.lock().unwrap(), vec!["next 1", "complete"]);
    }

    #[test]
    fn test_signal_helpers() {
        assert!(!Signal::Next(1).is_terminal());
        assert!(Signal::<u8>::Complete.is_terminal());
        assert_eq!(Signal::Next(5).into_value(), Some(5));
        assert_eq!(Signal::<u8>::Complete.into_value(), None);
    }
}
