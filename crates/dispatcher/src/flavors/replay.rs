//! Replay sink - 保留历史并重放给后来的订阅者
//!
//! 日志是带时间戳条目的 `VecDeque`，按序号寻址。`head` 是最旧保留条目的序号；
//! 每个订阅者记录下一个应收到条目的序号。
//! 游标落后于 `head` (条目在请求前已被淘汰) 时，
//! 从最旧的保留条目继续。

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use contracts::{
    Attr, AttrValue, Context, EmitResult, HotStream, ManySink, Scannable, SharedTimeSource,
    SignalError, Subscribe, Subscriber, Subscription, SystemClock,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, trace};

use super::inner::{Inner, InnerParent, InnerSubscription, Terminal, Wip};

/// 重放条目的最大存活时间
#[derive(Clone)]
pub struct AgeBound {
    pub max_age: Duration,
    pub clock: SharedTimeSource,
    /// 主动清理任务所用的 runtime；为空时只做惰性清理
    pub scheduler: Option<Handle>,
}

impl AgeBound {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            clock: SystemClock::shared(),
            scheduler: None,
        }
    }

    pub fn with_clock(mut self, clock: SharedTimeSource) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Handle) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    fn is_expired(&self, at: Duration, now: Duration) -> bool {
        now.saturating_sub(at) >= self.max_age
    }
}

impl fmt::Debug for AgeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgeBound")
            .field("max_age", &self.max_age)
            .field("scheduled", &self.scheduler.is_some())
            .finish()
    }
}

/// replay sink 保留哪些条目
#[derive(Clone)]
pub enum RetentionPolicy<T> {
    /// 全部保留；日志按 `batch_size` 扩容
    Unbounded { batch_size: usize },
    /// 保留最新的 `history_size` 条
    Count { history_size: usize },
    /// 保留未超龄的条目
    Age(AgeBound),
    /// 保留同时满足两个上限的条目
    CountAndAge { history_size: usize, age: AgeBound },
    /// 只保留最新一条，可用 `default` 预置
    Latest { default: Option<T> },
}

impl<T> RetentionPolicy<T> {
    pub fn label(&self) -> &'static str {
        match self {
            RetentionPolicy::Unbounded { .. } => "replay_all",
            RetentionPolicy::Count { .. } => "replay_limit",
            RetentionPolicy::Age(_) => "replay_limit_age",
            RetentionPolicy::CountAndAge { .. } => "replay_limit_both",
            RetentionPolicy::Latest { .. } => "replay_latest",
        }
    }
}

impl<T> fmt::Debug for RetentionPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionPolicy::Unbounded { batch_size } => f
                .debug_struct("Unbounded")
                .field("batch_size", batch_size)
                .finish(),
            RetentionPolicy::Count { history_size } => f
                .debug_struct("Count")
                .field("history_size", history_size)
                .finish(),
            RetentionPolicy::Age(age) => f.debug_tuple("Age").field(age).finish(),
            RetentionPolicy::CountAndAge { history_size, age } => f
                .debug_struct("CountAndAge")
                .field("history_size", history_size)
                .field("age", age)
                .finish(),
            RetentionPolicy::Latest { default } => f
                .debug_struct("Latest")
                .field("seeded", &default.is_some())
                .finish(),
        }
    }
}

/// 构建时确定的限制
struct Limits {
    history_size: Option<usize>,
    age: Option<AgeBound>,
    batch_size: Option<usize>,
}

impl Limits {
    fn now(&self) -> Duration {
        self.age
            .as_ref()
            .map(|a| a.clock.now())
            .unwrap_or_default()
    }
}

struct Entry<T> {
    value: T,
    at: Duration,
}

struct Cursor<T> {
    inner: Arc<Inner<T>>,
    next: u64,
}

struct State<T> {
    log: VecDeque<Entry<T>>,
    head: u64,
    cursors: Vec<Cursor<T>>,
    terminal: Option<Terminal>,
}

impl<T> State<T> {
    fn tail(&self) -> u64 {
        self.head + self.log.len() as u64
    }

    fn evict_front(&mut self) {
        if self.log.pop_front().is_some() {
            self.head += 1;
        }
    }

    fn prune(&mut self, limits: &Limits, now: Duration) -> usize {
        let before = self.log.len();
        if let Some(history) = limits.history_size {
            while self.log.len() > history {
                self.evict_front();
            }
        }
        if let Some(age) = &limits.age {
            while self
                .log
                .front()
                .is_some_and(|e| age.is_expired(e.at, now))
            {
                self.evict_front();
            }
        }
        before - self.log.len()
    }
}

struct Core<T> {
    me: Weak<Core<T>>,
    state: Mutex<State<T>>,
    wip: Wip,
    limits: Limits,
    label: &'static str,
}

/// 可重放的 multicast sink
pub struct ReplaySink<T> {
    core: Arc<Core<T>>,
}

impl<T: Clone + Send + Sync + 'static> ReplaySink<T> {
    /// # Panics
    /// `policy` 中任一容量或时长为 0 时。
    pub fn new(policy: RetentionPolicy<T>) -> Self {
        let label = policy.label();
        let (limits, seed) = match policy {
            RetentionPolicy::Unbounded { batch_size } => {
                assert!(batch_size > 0, "replay batch_size must be > 0");
                (
                    Limits {
                        history_size: None,
                        age: None,
                        batch_size: Some(batch_size),
                    },
                    None,
                )
            }
            RetentionPolicy::Count { history_size } => {
                assert!(history_size > 0, "replay history_size must be > 0");
                (
                    Limits {
                        history_size: Some(history_size),
                        age: None,
                        batch_size: None,
                    },
                    None,
                )
            }
            RetentionPolicy::Age(age) => {
                assert!(!age.max_age.is_zero(), "replay max_age must be > 0");
                (
                    Limits {
                        history_size: None,
                        age: Some(age),
                        batch_size: None,
                    },
                    None,
                )
            }
            RetentionPolicy::CountAndAge { history_size, age } => {
                assert!(history_size > 0, "replay history_size must be > 0");
                assert!(!age.max_age.is_zero(), "replay max_age must be > 0");
                (
                    Limits {
                        history_size: Some(history_size),
                        age: Some(age),
                        batch_size: None,
                    },
                    None,
                )
            }
            RetentionPolicy::Latest { default } => (
                Limits {
                    history_size: Some(1),
                    age: None,
                    batch_size: None,
                },
                default,
            ),
        };

        let mut log = VecDeque::with_capacity(limits.batch_size.unwrap_or(0));
        if let Some(value) = seed {
            log.push_back(Entry {
                value,
                at: limits.now(),
            });
        }

        let core = Arc::new_cyclic(|me| Core {
            me: me.clone(),
            state: Mutex::new(State {
                log,
                head: 0,
                cursors: Vec::new(),
                terminal: None,
            }),
            wip: Wip::default(),
            limits,
            label,
        });
        spawn_pruner(&core);
        Self { core }
    }

    fn terminate(&self, terminal: Terminal) -> EmitResult {
        {
            let mut st = self.core.state.lock();
            if st.terminal.is_some() {
                return EmitResult::FailTerminated;
            }
            debug!(
                flavor = self.core.label,
                state = terminal.label(),
                retained = st.log.len(),
                "sink terminated"
            );
            st.terminal = Some(terminal);
        }
        self.core.drain();
        EmitResult::Ok
    }
}

/// 在给定 runtime 上定期淘汰过期条目
///
/// 任务只持有 `Weak`，sink 释放后退出。
fn spawn_pruner<T: Clone + Send + Sync + 'static>(core: &Arc<Core<T>>) {
    let Some(age) = &core.limits.age else {
        return;
    };
    let Some(scheduler) = &age.scheduler else {
        return;
    };
    let period = age.max_age;
    let weak = Arc::downgrade(core);
    scheduler.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // 第一次 tick 立即完成
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(core) = weak.upgrade() else {
                break;
            };
            core.prune_now();
        }
    });
}

impl<T: Clone + Send + Sync + 'static> Core<T> {
    fn prune_now(&self) {
        let now = self.limits.now();
        let evicted = self.state.lock().prune(&self.limits, now);
        if evicted > 0 {
            trace!(flavor = self.label, evicted, "expired replay entries pruned");
        }
    }

    fn drain(&self) {
        self.wip.drain(|| self.drain_pass());
    }

    fn drain_pass(&self) {
        loop {
            let (deliveries, finished) = {
                let mut st = self.state.lock();
                let now = self.limits.now();
                st.prune(&self.limits, now);

                let head = st.head;
                let tail = st.tail();
                let terminal = st.terminal.clone();
                let State { log, cursors, .. } = &mut *st;

                let mut deliveries = Vec::new();
                let mut finished = Vec::new();
                cursors.retain_mut(|cursor| {
                    if cursor.next < head {
                        cursor.next = head;
                    }
                    let mut demand = cursor.inner.requested();
                    while demand > 0 && cursor.next < tail {
                        let entry = &log[(cursor.next - head) as usize];
                        deliveries.push((Arc::clone(&cursor.inner), entry.value.clone()));
                        cursor.next += 1;
                        demand -= 1;
                    }
                    match &terminal {
                        Some(t) if cursor.next == tail => {
                            finished.push((Arc::clone(&cursor.inner), t.clone()));
                            false
                        }
                        _ => true,
                    }
                });
                (deliveries, finished)
            };

            if deliveries.is_empty() && finished.is_empty() {
                return;
            }
            for (inner, value) in deliveries {
                inner.deliver(value);
            }
            for (inner, terminal) in finished {
                inner.terminate(&terminal);
            }
        }
    }
}

impl<T: Clone + Send + Sync + 'static> InnerParent<T> for Core<T> {
    fn on_request(&self) {
        self.drain();
    }

    fn remove(&self, inner: &Arc<Inner<T>>) {
        self.state
            .lock()
            .cursors
            .retain(|c| !Arc::ptr_eq(&c.inner, inner));
    }
}

impl<T: Clone + Send + Sync + 'static> Subscribe<T> for Core<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) -> Subscription {
        let inner = Inner::new(subscriber);
        {
            let mut st = self.state.lock();
            let now = self.limits.now();
            st.prune(&self.limits, now);
            let next = st.head;
            st.cursors.push(Cursor {
                inner: Arc::clone(&inner),
                next,
            });
        }
        let parent: Weak<dyn InnerParent<T>> = self.me.clone();
        let subscription = Subscription::new(Arc::new(InnerSubscription::new(inner, parent)));
        // 已终止且无保留条目：立即发送信号
        self.drain();
        subscription
    }
}

impl<T: Clone + Send + Sync + 'static> Scannable for ReplaySink<T> {
    fn scan(&self, attr: Attr) -> Option<AttrValue> {
        let mut st = self.core.state.lock();
        if matches!(attr, Attr::Buffered) {
            // 过期条目不计入
            let now = self.core.limits.now();
            st.prune(&self.core.limits, now);
        }
        match attr {
            Attr::Terminated => Some(AttrValue::Bool(st.terminal.is_some())),
            Attr::Cancelled => Some(AttrValue::Bool(false)),
            Attr::Capacity => Some(AttrValue::Usize(
                self.core.limits.history_size.unwrap_or(usize::MAX),
            )),
            Attr::Buffered => Some(AttrValue::Usize(st.log.len())),
            Attr::Subscribers => Some(AttrValue::Usize(st.cursors.len())),
            Attr::Name => Some(AttrValue::Str(self.core.label.to_string())),
            Attr::Rejected => None,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ManySink<T> for ReplaySink<T> {
    fn try_emit_next(&self, value: T) -> EmitResult {
        {
            let mut st = self.core.state.lock();
            if st.terminal.is_some() {
                return EmitResult::FailTerminated;
            }
            if let Some(batch) = self.core.limits.batch_size {
                if st.log.len() == st.log.capacity() {
                    st.log.reserve_exact(batch);
                }
            }
            let now = self.core.limits.now();
            st.log.push_back(Entry { value, at: now });
            st.prune(&self.core.limits, now);
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
        self.core.state.lock().cursors.len()
    }

    fn as_stream(&self) -> HotStream<T> {
        HotStream::new(self.core.clone())
    }

    fn current_context(&self) -> Context {
        self.core
            .state
            .lock()
            .cursors
            .first()
            .map(|c| c.inner.context())
            .unwrap_or_default()
    }
}
