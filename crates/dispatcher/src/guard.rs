//! Serialization guard
//!
//! 让单生产者 flavor 可被多个生产者并发调用，且永不阻塞。
//! 状态由准入计数器和当前占有受保护区域的调用者 id 组成：
//!
//! - 计数为 0：第一个把它从 0 推到 1 的调用者成为 owner
//! - 计数 > 0 且 owner 是调用者本身：重入，计数 + 1
//! - 其他情况：以 `FailNonSerialized` 拒绝
//!
//! 离开时计数减一；把计数降回 0 的调用者在 owner 仍是自己时
//! 清除 owner。

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use contracts::{
    Attr, AttrValue, Context, EmitResult, HotStream, Many, ManySink, Scannable, SignalError,
};
use tracing::trace;

use crate::metrics::{GuardMetrics, GuardSnapshot};

static NEXT_CALLER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CALLER_ID: u64 = NEXT_CALLER_ID.fetch_add(1, Ordering::Relaxed);
}

/// 调用线程唯一的非零 id
fn current_caller() -> u64 {
    CALLER_ID.with(|id| *id)
}

/// 非阻塞、可重入的 try-lock
#[derive(Debug, Default)]
pub struct SerializationGuard {
    wip: AtomicUsize,
    owner: AtomicU64,
    metrics: GuardMetrics,
}

impl SerializationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试进入受保护区域；`None` 表示已有其他调用者在内
    pub fn try_admit(&self) -> Option<Admission<'_>> {
        let caller = current_caller();
        if self.wip.load(Ordering::Acquire) == 0
            && self
                .wip
                .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        {
            // Relaxed 即可：其他调用者读到的只会是旧 id 或 0，
            // 不会是自己的 id。
            self.owner.store(caller, Ordering::Relaxed);
            self.metrics.inc_admitted();
            return Some(Admission {
                guard: self,
                caller,
            });
        }

        if self.owner.load(Ordering::Relaxed) != caller {
            self.metrics.inc_rejected();
            return None;
        }
        self.wip.fetch_add(1, Ordering::Acquire);
        self.metrics.inc_reentrant();
        Some(Admission {
            guard: self,
            caller,
        })
    }

    /// 当前在区域内的调用者数 (含重入)
    pub fn depth(&self) -> usize {
        self.wip.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> GuardSnapshot {
        self.metrics.snapshot()
    }
}

/// 准入凭证；drop 时离开区域 (panic 展开时同样生效)
#[must_use = "the guarded region ends when the admission is dropped"]
pub struct Admission<'a> {
    guard: &'a SerializationGuard,
    caller: u64,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.guard.wip.fetch_sub(1, Ordering::Release) == 1 {
            let _ = self.guard.owner.compare_exchange(
                self.caller,
                0,
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
        }
    }
}

/// emit 操作经过 [`SerializationGuard`] 的 sink
pub struct SerializedSink<T> {
    delegate: Many<T>,
    guard: SerializationGuard,
    name: String,
}

impl<T: Clone + Send + Sync + 'static> SerializedSink<T> {
    pub fn new(delegate: Many<T>) -> Self {
        let name = delegate
            .scan(Attr::Name)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            delegate,
            guard: SerializationGuard::new(),
            name,
        }
    }

    pub fn guard_metrics(&self) -> GuardSnapshot {
        self.guard.metrics()
    }

    fn rejected(&self) -> EmitResult {
        trace!(sink = %self.name, "emission rejected, sink busy on another caller");
        ::metrics::counter!("reactive_sinks_guard_rejections_total", "sink" => self.name.clone())
            .increment(1);
        EmitResult::FailNonSerialized
    }
}

impl<T: Clone + Send + Sync + 'static> ManySink<T> for SerializedSink<T> {
    fn try_emit_next(&self, value: T) -> EmitResult {
        let Some(_admission) = self.guard.try_admit() else {
            return self.rejected();
        };
        self.delegate.try_emit_next(value)
    }

    fn try_emit_complete(&self) -> EmitResult {
        let Some(_admission) = self.guard.try_admit() else {
            return self.rejected();
        };
        self.delegate.try_emit_complete()
    }

    fn try_emit_error(&self, error: SignalError) -> EmitResult {
        let Some(_admission) = self.guard.try_admit() else {
            return self.rejected();
        };
        self.delegate.try_emit_error(error)
    }

    fn current_subscriber_count(&self) -> usize {
        self.delegate.current_subscriber_count()
    }

    fn as_stream(&self) -> HotStream<T> {
        self.delegate.as_stream()
    }

    fn current_context(&self) -> Context {
        self.delegate.current_context()
    }
}

impl<T: Clone + Send + Sync + 'static> Scannable for SerializedSink<T> {
    fn scan(&self, attr: Attr) -> Option<AttrValue> {
        match attr {
            Attr::Rejected => Some(AttrValue::Usize(self.guard.metrics().rejected as usize)),
            other => self.delegate.scan(other),
        }
    }
}

impl<T> fmt::Debug for SerializedSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializedSink")
            .field("delegate", &self.name)
            .field("depth", &self.guard.depth())
            .finish()
    }
}

impl<T> fmt::Display for SerializedSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "serialized({})", self.name)
    }
}
