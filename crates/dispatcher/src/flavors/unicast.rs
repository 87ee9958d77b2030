//! 带缓冲的 unicast sink - 单订阅者 + 积压队列 + 可选结束回调

use std::sync::{Arc, Weak};

use contracts::{
    Attr, AttrValue, Context, ContractError, EmitResult, HotStream, ManySink, Scannable,
    SignalError, Subscribe, Subscriber, Subscription,
};
use parking_lot::Mutex;
use tracing::debug;

use super::inner::{Inner, InnerParent, InnerSubscription, Terminal, Wip};
use super::queue::{QueueDiscipline, SinkQueue};

/// sink 结束后执行一次的资源清理回调
pub type EndCallback = Box<dyn FnOnce() + Send>;

struct State<T> {
    queue: Box<dyn SinkQueue<T>>,
    subscriber: Option<Arc<Inner<T>>>,
    ever_subscribed: bool,
    terminal: Option<Terminal>,
    cancelled: bool,
    on_terminate: Option<EndCallback>,
}

impl<T> State<T> {
    fn take_end_callback_if_drained(&mut self) -> Option<EndCallback> {
        if self.terminal.is_some() && self.queue.is_empty() {
            self.on_terminate.take()
        } else {
            None
        }
    }
}

struct Core<T> {
    me: Weak<Core<T>>,
    state: Mutex<State<T>>,
    wip: Wip,
}

/// 缓冲数据直到唯一订阅者请求的 unicast sink
pub struct UnicastSink<T> {
    core: Arc<Core<T>>,
}

impl<T: Clone + Send + Sync + 'static> UnicastSink<T> {
    pub fn new(queue: QueueDiscipline<T>, on_terminate: Option<EndCallback>) -> Self {
        let queue = queue.into_queue();
        let core = Arc::new_cyclic(|me| Core {
            me: me.clone(),
            state: Mutex::new(State {
                queue,
                subscriber: None,
                ever_subscribed: false,
                terminal: None,
                cancelled: false,
                on_terminate,
            }),
            wip: Wip::default(),
        });
        Self { core }
    }

    fn terminate(&self, terminal: Terminal) -> EmitResult {
        let end_callback = {
            let mut st = self.core.state.lock();
            if st.terminal.is_some() {
                return EmitResult::FailTerminated;
            }
            if st.cancelled {
                return EmitResult::FailCancelled;
            }
            debug!(flavor = "unicast", state = terminal.label(), "sink terminated");
            st.terminal = Some(terminal);
            // 无订阅者且无缓冲：已排空
            if st.subscriber.is_none() {
                st.take_end_callback_if_drained()
            } else {
                None
            }
        };
        if let Some(callback) = end_callback {
            callback();
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
            let (subscriber, batch, terminal, end_callback) = {
                let mut st = self.state.lock();
                let Some(subscriber) = st.subscriber.clone() else {
                    return;
                };
                let mut demand = subscriber.requested();
                let mut batch = Vec::new();
                while demand > 0 {
                    match st.queue.poll() {
                        Some(v) => batch.push(v),
                        None => break,
                    }
                    demand -= 1;
                }
                let terminal = if st.queue.is_empty() {
                    st.terminal.clone()
                } else {
                    None
                };
                let end_callback = if terminal.is_some() {
                    st.subscriber = None;
                    st.on_terminate.take()
                } else {
                    None
                };
                (subscriber, batch, terminal, end_callback)
            };

            if batch.is_empty() && terminal.is_none() {
                return;
            }
            for value in batch {
                subscriber.deliver(value);
            }
            if let Some(terminal) = terminal {
                subscriber.terminate(&terminal);
                if let Some(callback) = end_callback {
                    callback();
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
        let end_callback = {
            let mut st = self.state.lock();
            let attached = st
                .subscriber
                .as_ref()
                .is_some_and(|s| Arc::ptr_eq(s, inner));
            if !attached {
                return;
            }
            st.subscriber = None;
            if st.terminal.is_none() {
                st.cancelled = true;
            }
            st.queue.clear();
            st.on_terminate.take()
        };
        debug!(flavor = "unicast", "subscriber cancelled");
        if let Some(callback) = end_callback {
            callback();
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Subscribe<T> for Core<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) -> Subscription {
        let inner = Inner::new(subscriber);
        {
            let mut st = self.state.lock();
            if st.ever_subscribed {
                drop(st);
                inner.reject(ContractError::UnicastAlreadySubscribed.into_signal());
                return Subscription::detached();
            }
            st.ever_subscribed = true;
            st.subscriber = Some(Arc::clone(&inner));
        }
        let parent: Weak<dyn InnerParent<T>> = self.me.clone();
        let subscription = Subscription::new(Arc::new(InnerSubscription::new(inner, parent)));
        // 已终止且队列为空：立即发送终止信号
        self.drain();
        subscription
    }
}

impl<T: Clone + Send + Sync + 'static> Scannable for UnicastSink<T> {
    fn scan(&self, attr: Attr) -> Option<AttrValue> {
        let st = self.core.state.lock();
        match attr {
            Attr::Terminated => Some(AttrValue::Bool(st.terminal.is_some())),
            Attr::Cancelled => Some(AttrValue::Bool(st.cancelled)),
            Attr::Capacity => Some(AttrValue::Usize(st.queue.capacity().unwrap_or(usize::MAX))),
            Attr::Buffered => Some(AttrValue::Usize(st.queue.len())),
            Attr::Subscribers => Some(AttrValue::Usize(st.subscriber.is_some() as usize)),
            Attr::Name => Some(AttrValue::Str("unicast".to_string())),
            Attr::Rejected => None,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ManySink<T> for UnicastSink<T> {
    fn try_emit_next(&self, value: T) -> EmitResult {
        {
            let mut st = self.core.state.lock();
            if st.terminal.is_some() {
                return EmitResult::FailTerminated;
            }
            if st.cancelled {
                return EmitResult::FailCancelled;
            }
            if st.queue.offer(value).is_err() {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flavors::inner::test_support::Recorder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_callback() -> (Arc<AtomicUsize>, EndCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (
            count,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_buffers_until_requested() {
        let sink = UnicastSink::new(QueueDiscipline::Unbounded, None);
        assert_eq!(sink.try_emit_next(1), EmitResult::Ok);
        assert_eq!(sink.try_emit_next(2), EmitResult::Ok);

        let recorder = Recorder::new();
        let subscription = sink.as_stream().subscribe(recorder.clone());
        assert!(recorder.values().is_empty());

        subscription.request(1);
        assert_eq!(recorder.values(), vec![1]);
        subscription.request(5);
        assert_eq!(recorder.values(), vec![1, 2]);
        assert_eq!(sink.try_emit_next(3), EmitResult::Ok);
        assert_eq!(recorder.values(), vec![1, 2, 3]);
    }

    #[test]
    fn test_bounded_queue_overflows() {
        let sink = UnicastSink::new(QueueDiscipline::Bounded(2), None);
        assert_eq!(sink.try_emit_next(1), EmitResult::Ok);
        assert_eq!(sink.try_emit_next(2), EmitResult::Ok);
        assert_eq!(sink.try_emit_next(3), EmitResult::FailOverflow);
        assert_eq!(sink.scan_usize(Attr::Buffered), Some(2));
    }

    #[test]
    fn test_second_subscriber_rejected() {
        let sink = UnicastSink::<u8>::new(QueueDiscipline::Unbounded, None);
        let first = Recorder::new();
        let second = Recorder::new();
        sink.as_stream().subscribe(first.clone());
        let rejected = sink.as_stream().subscribe(second.clone());

        assert!(rejected.is_cancelled());
        assert!(second.errored());
        assert!(!first.errored());
        assert_eq!(sink.current_subscriber_count(), 1);
    }

    #[test]
    fn test_end_callback_after_drain() {
        let (count, callback) = counting_callback();
        let sink = UnicastSink::new(QueueDiscipline::Unbounded, Some(callback));
        sink.try_emit_next(1);
        assert_eq!(sink.try_emit_complete(), EmitResult::Ok);
        // 已终止，但队列中仍有一个值
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let recorder = Recorder::new();
        sink.as_stream().subscribe_unbounded(recorder.clone());
        assert_eq!(recorder.values(), vec![1]);
        assert!(recorder.completed());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert_eq!(sink.try_emit_complete(), EmitResult::FailTerminated);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_end_callback_when_terminated_empty() {
        let (count, callback) = counting_callback();
        let sink = UnicastSink::<u8>::new(QueueDiscipline::Unbounded, Some(callback));
        sink.try_emit_error(ContractError::Other("boom".into()).into_signal());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_runs_callback_and_fails_later_emits() {
        let (count, callback) = counting_callback();
        let sink = UnicastSink::new(QueueDiscipline::Unbounded, Some(callback));
        let subscription = sink.as_stream().subscribe(Recorder::new());
        sink.try_emit_next(1);
        subscription.cancel();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(sink.try_emit_next(2), EmitResult::FailCancelled);
        assert!(sink.scan_bool(Attr::Cancelled));
        assert_eq!(sink.scan_usize(Attr::Buffered), Some(0));
    }
}
