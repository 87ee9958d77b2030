//! Direct multicast sink - 无缓冲，每次 emit 时决定投递

use std::fmt;
use std::sync::{Arc, Weak};

use contracts::{
    Attr, AttrValue, Context, EmitResult, HotStream, ManySink, Scannable, SignalError, Subscribe,
    Subscriber, Subscription,
};
use parking_lot::RwLock;
use tracing::debug;

use super::inner::{Inner, InnerParent, InnerSubscription, Terminal};

/// 部分订阅者没有 demand 时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// 要么全部收到，要么都收不到 (`FailOverflow`)
    AllOrNothing,
    /// 没有 demand 的订阅者直接错过该值
    BestEffort,
}

impl DeliveryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryMode::AllOrNothing => "direct_all_or_nothing",
            DeliveryMode::BestEffort => "direct_best_effort",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct State<T> {
    subscribers: Vec<Arc<Inner<T>>>,
    terminal: Option<Terminal>,
}

struct Core<T> {
    me: Weak<Core<T>>,
    state: RwLock<State<T>>,
}

/// 无缓冲 multicast sink
pub struct DirectSink<T> {
    core: Arc<Core<T>>,
    mode: DeliveryMode,
}

impl<T: Clone + Send + Sync + 'static> DirectSink<T> {
    pub fn new(mode: DeliveryMode) -> Self {
        let core = Arc::new_cyclic(|me| Core {
            me: me.clone(),
            state: RwLock::new(State {
                subscribers: Vec::new(),
                terminal: None,
            }),
        });
        Self { core, mode }
    }

    fn terminate(&self, terminal: Terminal) -> EmitResult {
        let subscribers = {
            let mut st = self.core.state.write();
            if st.terminal.is_some() {
                return EmitResult::FailTerminated;
            }
            st.terminal = Some(terminal.clone());
            std::mem::take(&mut st.subscribers)
        };
        debug!(
            flavor = self.mode.as_str(),
            state = terminal.label(),
            subscribers = subscribers.len(),
            "sink terminated"
        );
        for subscriber in subscribers {
            subscriber.terminate(&terminal);
        }
        EmitResult::Ok
    }
}

impl<T: Send + Sync + 'static> InnerParent<T> for Core<T> {
    fn on_request(&self) {}

    fn remove(&self, inner: &Arc<Inner<T>>) {
        self.state
            .write()
            .subscribers
            .retain(|s| !Arc::ptr_eq(s, inner));
    }
}

impl<T: Send + Sync + 'static> Subscribe<T> for Core<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) -> Subscription {
        let inner = Inner::new(subscriber);
        let mut st = self.state.write();
        if let Some(terminal) = st.terminal.clone() {
            drop(st);
            inner.terminate(&terminal);
            return Subscription::detached();
        }
        st.subscribers.push(Arc::clone(&inner));
        drop(st);

        let parent: Weak<dyn InnerParent<T>> = self.me.clone();
        Subscription::new(Arc::new(InnerSubscription::new(inner, parent)))
    }
}

impl<T: Clone + Send + Sync + 'static> Scannable for DirectSink<T> {
    fn scan(&self, attr: Attr) -> Option<AttrValue> {
        let st = self.core.state.read();
        match attr {
            Attr::Terminated => Some(AttrValue::Bool(st.terminal.is_some())),
            Attr::Cancelled => Some(AttrValue::Bool(false)),
            Attr::Capacity | Attr::Buffered => Some(AttrValue::Usize(0)),
            Attr::Subscribers => Some(AttrValue::Usize(st.subscribers.len())),
            Attr::Name => Some(AttrValue::Str(self.mode.as_str().to_string())),
            Attr::Rejected => None,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ManySink<T> for DirectSink<T> {
    fn try_emit_next(&self, value: T) -> EmitResult {
        let subscribers: Vec<Arc<Inner<T>>> = {
            let st = self.core.state.read();
            if st.terminal.is_some() {
                return EmitResult::FailTerminated;
            }
            st.subscribers
                .iter()
                .filter(|s| !s.is_cancelled())
                .cloned()
                .collect()
        };
        if subscribers.is_empty() {
            return EmitResult::FailZeroSubscriber;
        }

        match self.mode {
            DeliveryMode::AllOrNothing => {
                if subscribers.iter().any(|s| !s.has_demand()) {
                    return EmitResult::FailOverflow;
                }
                for subscriber in &subscribers {
                    subscriber.deliver(value.clone());
                }
            }
            DeliveryMode::BestEffort => {
                for subscriber in subscribers.iter().filter(|s| s.has_demand()) {
                    subscriber.deliver(value.clone());
                }
            }
        }
        EmitResult::Ok
    }

    fn try_emit_complete(&self) -> EmitResult {
        self.terminate(Terminal::Completed)
    }

    fn try_emit_error(&self, error: SignalError) -> EmitResult {
        self.terminate(Terminal::Errored(error))
    }

    fn current_subscriber_count(&self) -> usize {
        self.core.state.read().subscribers.len()
    }

    fn as_stream(&self) -> HotStream<T> {
        HotStream::new(self.core.clone())
    }

    fn current_context(&self) -> Context {
        self.core
            .state
            .read()
            .subscribers
            .first()
            .map(|s| s.context())
            .unwrap_or_default()
    }
}
