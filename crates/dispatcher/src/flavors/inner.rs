//! 各 flavor 共用的订阅者状态记录
//!
//! `Inner` 记录单个订阅者的 demand 与取消状态。flavor 在状态中持有
//! `Arc<Inner<T>>`，并交出 `InnerSubscription`，后者通过 `Weak`
//! 把 `request`/`cancel` 转回所属 flavor。

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use contracts::{Context, Demand, SignalError, Subscriber};

/// sink 的终止状态，一旦设置不再改变
#[derive(Clone)]
pub(crate) enum Terminal {
    Completed,
    Errored(SignalError),
}

impl Terminal {
    pub(crate) fn from_error(error: Option<SignalError>) -> Self {
        match error {
            Some(e) => Terminal::Errored(e),
            None => Terminal::Completed,
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Terminal::Completed => "completed",
            Terminal::Errored(_) => "errored",
        }
    }
}

/// 单个已连接订阅者
pub(crate) struct Inner<T> {
    actual: Arc<dyn Subscriber<T>>,
    requested: AtomicU64,
    cancelled: AtomicBool,
    terminated: AtomicBool,
}

impl<T> Inner<T> {
    pub(crate) fn new(actual: Arc<dyn Subscriber<T>>) -> Arc<Self> {
        Arc::new(Self {
            actual,
            requested: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        })
    }

    #[inline]
    pub(crate) fn requested(&self) -> u64 {
        self.requested.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn has_demand(&self) -> bool {
        self.requested() > 0
    }

    /// 饱和加法；`u64::MAX` 保持无界
    pub(crate) fn add_demand(&self, n: u64) {
        let mut current = self.requested.load(Ordering::Acquire);
        loop {
            if current == u64::MAX {
                return;
            }
            let next = current.saturating_add(n);
            match self.requested.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    fn produced(&self, n: u64) {
        let mut current = self.requested.load(Ordering::Acquire);
        loop {
            if current == u64::MAX {
                return;
            }
            let next = current.saturating_sub(n);
            match self.requested.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    #[inline]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// 仅第一个调用者返回 true
    pub(crate) fn mark_cancelled(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    /// 投递一个值，消耗一个 demand
    pub(crate) fn deliver(&self, value: T) {
        if self.is_cancelled() || self.terminated.load(Ordering::Acquire) {
            return;
        }
        self.produced(1);
        self.actual.on_next(value);
    }

    /// 终止信号最多投递一次
    pub(crate) fn terminate(&self, terminal: &Terminal) {
        if self.terminated.swap(true, Ordering::AcqRel) || self.is_cancelled() {
            return;
        }
        match terminal {
            Terminal::Completed => self.actual.on_complete(),
            Terminal::Errored(e) => self.actual.on_error(Arc::clone(e)),
        }
    }

    /// 拒绝无法连接的订阅者
    pub(crate) fn reject(&self, error: SignalError) {
        if !self.terminated.swap(true, Ordering::AcqRel) {
            self.actual.on_error(error);
        }
    }

    pub(crate) fn context(&self) -> Context {
        self.actual.context()
    }
}

/// 订阅句柄可回调的 flavor 接口
pub(crate) trait InnerParent<T>: Send + Sync {
    /// demand 增加，投递待发数据
    fn on_request(&self);

    /// 订阅者已取消，将其移除
    fn remove(&self, inner: &Arc<Inner<T>>);
}

/// 交给订阅者的 `Demand` 实现
pub(crate) struct InnerSubscription<T> {
    inner: Arc<Inner<T>>,
    parent: Weak<dyn InnerParent<T>>,
}

impl<T> InnerSubscription<T> {
    pub(crate) fn new(inner: Arc<Inner<T>>, parent: Weak<dyn InnerParent<T>>) -> Self {
        Self { inner, parent }
    }
}

impl<T: Send + Sync + 'static> Demand for InnerSubscription<T> {
    fn request(&self, n: u64) {
        if n == 0 || self.inner.is_cancelled() {
            return;
        }
        self.inner.add_demand(n);
        if let Some(parent) = self.parent.upgrade() {
            parent.on_request();
        }
    }

    fn cancel(&self) {
        if self.inner.mark_cancelled() {
            if let Some(parent) = self.parent.upgrade() {
                parent.remove(&self.inner);
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}

/// drain 循环的 work-in-progress 计数器
///
/// 把计数器从 0 推高的调用者负责 drain，其他调用者
/// 只记录需要再跑一轮。
#[derive(Debug, Default)]
pub(crate) struct Wip(AtomicUsize);

impl Wip {
    /// 调用者需要执行 drain 循环时返回 true
    #[inline]
    pub(crate) fn enter(&self) -> bool {
        self.0.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// 确认 `missed` 轮，返回仍待处理的轮数
    #[inline]
    pub(crate) fn leave(&self, missed: usize) -> usize {
        self.0.fetch_sub(missed, Ordering::AcqRel) - missed
    }

    /// 反复执行 `pass` 直到没有新的工作信号
    pub(crate) fn drain(&self, mut pass: impl FnMut()) {
        if !self.enter() {
            return;
        }
        let mut missed = 1;
        loop {
            pass();
            missed = self.leave(missed);
            if missed == 0 {
                break;
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::Recorder;
    use super::*;

    #[test]
    fn test_demand_saturates_and_unbounded_is_sticky() {
        let inner = Inner::new(Recorder::<u8>::new());
        inner.add_demand(u64::MAX - 1);
        inner.add_demand(5);
        assert_eq!(inner.requested(), u64::MAX);

        inner.deliver(1);
        assert_eq!(inner.requested(), u64::MAX);
    }

    #[test]
    fn test_deliver_consumes_demand() {
        let recorder = Recorder::<u8>::new();
        let inner = Inner::new(recorder.clone());
        inner.add_demand(2);
        inner.deliver(1);
        inner.deliver(2);

        assert_eq!(inner.requested(), 0);
        assert_eq!(recorder.values(), vec![1, 2]);
    }

    #[test]
    fn test_terminate_once_and_not_after_cancel() {
        let recorder = Recorder::<u8>::new();
        let inner = Inner::new(recorder.clone());
        inner.terminate(&Terminal::Completed);
        inner.terminate(&Terminal::Completed);
        assert!(recorder.completed());

        let cancelled = Recorder::<u8>::new();
        let inner = Inner::new(cancelled.clone());
        assert!(inner.mark_cancelled());
        assert!(!inner.mark_cancelled());
        inner.terminate(&Terminal::Completed);
        assert!(!cancelled.completed());
    }

    #[test]
    fn test_wip_reentrant_drain_runs_extra_pass() {
        let wip = Wip::default();
        let mut passes = 0;
        wip.drain(|| {
            passes += 1;
            if passes == 1 {
                // 模拟嵌套调用者发出新的工作信号
                assert!(!wip.enter());
            }
        });
        assert_eq!(passes, 2);
    }
}
