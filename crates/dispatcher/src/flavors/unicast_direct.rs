//! 无背压缓冲的 unicast sink
//!
//! 值直接交给订阅者，否则失败：尚无订阅者返回
//! `FailZeroSubscriber`，订阅者没有 demand 返回 `FailOverflow`。

use std::sync::{Arc, Weak};

use contracts::{
    Attr, AttrValue, Context, ContractError, EmitResult, HotStream, ManySink, Scannable,
    SignalError, Subscribe, Subscriber, Subscription,
};
use parking_lot::Mutex;
use tracing::debug;

use super::inner::{Inner, InnerParent, InnerSubscription, Terminal};

struct State<T> {
    subscriber: Option<Arc<Inner<T>>>,
    ever_subscribed: bool,
    terminal: Option<Terminal>,
    cancelled: bool,
}

struct Core<T> {
    me: Weak<Core<T>>,
    state: Mutex<State<T>>,
}

/// 不做缓冲的 unicast sink
pub struct UnicastDirectSink<T> {
    core: Arc<Core<T>>,
}

impl<T: Clone + Send + Sync + 'static> UnicastDirectSink<T> {
    pub fn new() -> Self {
        let core = Arc::new_cyclic(|me| Core {
            me: me.clone(),
            state: Mutex::new(State {
                subscriber: None,
                ever_subscribed: false,
                terminal: None,
                cancelled: false,
            }),
        });
        Self { core }
    }

    fn terminate(&self, terminal: Terminal) -> EmitResult {
        let subscriber = {
            let mut st = self.core.state.lock();
            if st.terminal.is_some() {
                return EmitResult::FailTerminated;
            }
            if st.cancelled {
                return EmitResult::FailCancelled;
            }
            st.terminal = Some(terminal.clone());
            st.subscriber.take()
        };
        debug!(
            flavor = "unicast_no_backpressure",
            state = terminal.label(),
            "sink terminated"
        );
        if let Some(subscriber) = subscriber {
            subscriber.terminate(&terminal);
        }
        EmitResult::Ok
    }
}

impl<T: Clone + Send + Sync + 'static> Default for UnicastDirectSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> InnerParent<T> for Core<T> {
    fn on_request(&self) {}

    fn remove(&self, inner: &Arc<Inner<T>>) {
        let mut st = self.state.lock();
        if st
            .subscriber
            .as_ref()
            .is_some_and(|s| Arc::ptr_eq(s, inner))
        {
            st.subscriber = None;
            st.cancelled = true;
        }
    }
}

impl<T: Send + Sync + 'static> Subscribe<T> for Core<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) -> Subscription {
        let inner = Inner::new(subscriber);
        let mut st = self.state.lock();
        if st.ever_subscribed {
            drop(st);
            inner.reject(ContractError::UnicastAlreadySubscribed.into_signal());
            return Subscription::detached();
        }
        st.ever_subscribed = true;
        if let Some(terminal) = st.terminal.clone() {
            drop(st);
            inner.terminate(&terminal);
            return Subscription::detached();
        }
        st.subscriber = Some(Arc::clone(&inner));
        drop(st);

        let parent: Weak<dyn InnerParent<T>> = self.me.clone();
        Subscription::new(Arc::new(InnerSubscription::new(inner, parent)))
    }
}

impl<T: Clone + Send + Sync + 'static> Scannable for UnicastDirectSink<T> {
    fn scan(&self, attr: Attr) -> Option<AttrValue> {
        let st = self.core.state.lock();
        match attr {
            Attr::Terminated => Some(AttrValue::Bool(st.terminal.is_some())),
            Attr::Cancelled => Some(AttrValue::Bool(st.cancelled)),
            Attr::Capacity | Attr::Buffered => Some(AttrValue::Usize(0)),
            Attr::Subscribers => Some(AttrValue::Usize(st.subscriber.is_some() as usize)),
            Attr::Name => Some(AttrValue::Str("unicast_no_backpressure".to_string())),
            Attr::Rejected => None,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ManySink<T> for UnicastDirectSink<T> {
    fn try_emit_next(&self, value: T) -> EmitResult {
        let subscriber = {
            let st = self.core.state.lock();
            if st.terminal.is_some() {
                return EmitResult::FailTerminated;
            }
            if st.cancelled {
                return EmitResult::FailCancelled;
            }
            match &st.subscriber {
                Some(s) => Arc::clone(s),
                None => return EmitResult::FailZeroSubscriber,
            }
        };
        if !subscriber.has_demand() {
            return EmitResult::FailOverflow;
        }
        subscriber.deliver(value);
        EmitResult::Ok
    }

    fn try_emit_complete(&self) -> EmitResult {
        self.terminate(Terminal::Completed)
    }

    fn try_emit_error(&self, error: SignalError) -> EmitResult {
        self.terminate(Terminal::Errored(error))
    }

    fn current_subscriber_count(&self) -> usize {
        self.core.state.lock().subscriber.is_some() as usize
    }

    fn as_stream(&self) -> HotStream<T> {
        HotStream::new(self.core.clone())
    }

    fn current_context(&self) -> Context {
        self.core
            .state
            .lock()
            .subscriber
            .as_ref()
            .map(|s| s.context())
            .unwrap_or_default()
    }
}
