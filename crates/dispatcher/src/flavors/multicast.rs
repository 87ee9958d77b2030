//! 带缓冲的 multicast sink
//!
//! 所有订阅者共享一个有界积压队列。只有当所有已连接订阅者都有 demand 时，
//! 值才会出队，因此由最慢的订阅者决定节奏。

use std::sync::{Arc, Weak};

use contracts::{
    Attr, AttrValue, Context, EmitResult, HotStream, ManySink, Scannable, SignalError, Subscribe,
    Subscriber, Subscription,
};
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use tracing::debug;

use super::inner::{Inner, InnerParent, InnerSubscription, Terminal, Wip};

struct State<T> {
    backlog: HeapRb<T>,
    subscribers: Vec<Arc<Inner<T>>>,
    terminal: Option<Terminal>,
    cancelled: bool,
}

struct Core<T> {
    me: Weak<Core<T>>,
    state: Mutex<State<T>>,
    wip: Wip,
    buffer_size: usize,
    auto_cancel: bool,
}

/// 共享有界积压队列的 multicast sink
pub struct MulticastSink<T> {
    core: Arc<Core<T>>,
}

impl<T: Clone + Send + Sync + 'static> MulticastSink<T> {
    /// # Panics
    /// `buffer_size` 为 0 时。
    pub fn new(buffer_size: usize, auto_cancel: bool) -> Self {
        assert!(buffer_size > 0, "multicast buffer_size must be > 0");
        let core = Arc::new_cyclic(|me| Core {
            me: me.clone(),
            state: Mutex::new(State {
                backlog: HeapRb::new(buffer_size),
                subscribers: Vec::new(),
                terminal: None,
                cancelled: false,
            }),
            wip: Wip::default(),
            buffer_size,
            auto_cancel,
        });
        Self { core }
    }

    fn terminate(&self, terminal: Terminal) -> EmitResult {
        {
            let mut st = self.core.state.lock();
            if st.terminal.is_some() {
                return EmitResult::FailTerminated;
            }
            if st.cancelled {
                return EmitResult::FailCancelled;
            }
            debug!(
                flavor = "multicast",
                state = terminal.label(),
                buffered = st.backlog.occupied_len(),
                "sink terminated"
            );
            st.terminal = Some(terminal);
        }
        self.core.drain();
        EmitResult::Ok
    }
}

impl<T: Clone + Send + Sync + 'static> Core<T> {
    fn drain(&self) {
        self.wip.drain(|| self.drain_pass());
    }

    fn drain_pass(&self) {
        loop {
            let (subscribers, batch, terminal) = {
                let mut st = self.state.lock();
                if st.subscribers.is_empty() {
                    return;
                }
                let mut demand = st
                    .subscribers
                    .iter()
                    .map(|s| s.requested())
                    .min()
                    .unwrap_or(0);
                let mut batch = Vec::new();
                while demand > 0 {
                    match st.backlog.try_pop() {
                        Some(v) => batch.push(v),
                        None => break,
                    }
                    demand -= 1;
                }
                let terminal = if st.backlog.is_empty() {
                    st.terminal.clone()
                } else {
                    None
                };
                let subscribers = if terminal.is_some() {
                    std::mem::take(&mut st.subscribers)
                } else {
                    st.subscribers.clone()
                };
                (subscribers, batch, terminal)
            };

            if batch.is_empty() && terminal.is_none() {
                return;
            }
            for value in batch {
                for subscriber in &subscribers {
                    subscriber.deliver(value.clone());
                }
            }
            if let Some(terminal) = terminal {
                for subscriber in &subscribers {
                    subscriber.terminate(&terminal);
                }
                return;
            }
        }
    }
}

impl<T: Clone + Send + Sync + 'static> InnerParent<T> for Core<T> {
    fn on_request(&self) {
        self.drain();
    }

    fn remove(&self, inner: &Arc<Inner<T>>) {
        {
            let mut st = self.state.lock();
            st.subscribers.retain(|s| !Arc::ptr_eq(s, inner));
            if self.auto_cancel
                && st.subscribers.is_empty()
                && st.terminal.is_none()
                && !st.cancelled
            {
                st.cancelled = true;
                Consumer::clear(&mut st.backlog);
                debug!(flavor = "multicast", "last subscriber left, sink cancelled");
                return;
            }
        }
        // 离开的可能正是最慢的订阅者
        self.drain();
    }
}

impl<T: Clone + Send + Sync + 'static> Subscribe<T> for Core<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) -> Subscription {
        let inner = Inner::new(subscriber);
        {
            let mut st = self.state.lock();
            let finished = if st.cancelled {
                Some(Terminal::Completed)
            } else if st.backlog.is_empty() {
                st.terminal.clone()
            } else {
                None
            };
            if let Some(terminal) = finished {
                drop(st);
                inner.terminate(&terminal);
                return Subscription::detached();
            }
            st.subscribers.push(Arc::clone(&inner));
        }
        let parent: Weak<dyn InnerParent<T>> = self.me.clone();
        let subscription = Subscription::new(Arc::new(InnerSubscription::new(inner, parent)));
        self.drain();
        subscription
    }
}

impl<T: Clone + Send + Sync + 'static> Scannable for MulticastSink<T> {
    fn scan(&self, attr: Attr) -> Option<AttrValue> {
        let st = self.core.state.lock();
        match attr {
            Attr::Terminated => Some(AttrValue::Bool(st.terminal.is_some())),
            Attr::Cancelled => Some(AttrValue::Bool(st.cancelled)),
            Attr::Capacity => Some(AttrValue::Usize(self.core.buffer_size)),
            Attr::Buffered => Some(AttrValue::Usize(st.backlog.occupied_len())),
            Attr::Subscribers => Some(AttrValue::Usize(st.subscribers.len())),
            Attr::Name => Some(AttrValue::Str("multicast".to_string())),
            Attr::Rejected => None,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ManySink<T> for MulticastSink<T> {
    fn try_emit_next(&self, value: T) -> EmitResult {
        {
            let mut st = self.core.state.lock();
            if st.terminal.is_some() {
                return EmitResult::FailTerminated;
            }
            if st.cancelled {
                return EmitResult::FailCancelled;
            }
            if st.backlog.try_push(value).is_err() {
                return EmitResult::FailOverflow;
            }
        }
        self.core.drain();
        EmitResult::Ok
    }

    fn try_emit_complete(&self) -> EmitResult {
        self.terminate(Terminal::Completed)
    }

    fn try_emit_error(&self, error: SignalError) -> EmitResult {
        self.terminate(Terminal::Errored(error))
    }

    fn current_subscriber_count(&self) -> usize {
        self.core.state.lock().subscribers.len()
    }

    fn as_stream(&self) -> HotStream<T> {
        HotStream::new(self.core.clone())
    }

    fn current_context(&self) -> Context {
        self.core
            .state
            .lock()
            .subscribers
            .first()
            .map(|s| s.context())
            .unwrap_or_default()
    }
}
