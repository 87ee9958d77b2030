//! Sink 规格
//!
//! 入口为 [`Sinks::many`]。每个构建方法都会确定一个 [`Flavor`]，
//! 再经由 [`SinkSpec::build`] 分配 flavor，safe 规格下
//! 还会包装为 [`SerializedSink`]。
//!
//! ```ignore
//! let sink: Many<u32> = Sinks::many().multicast().on_backpressure_buffer();
//! let bare: Many<u32> = Sinks::many().unsafe_().replay().limit(16);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use contracts::{Many, SharedTimeSource};
use tokio::runtime::Handle;
use tracing::debug;

use crate::flavors::{
    AgeBound, DeliveryMode, DirectSink, EndCallback, MulticastSink, QueueDiscipline, ReplaySink,
    RetentionPolicy, UnicastDirectSink, UnicastSink,
};
use crate::guard::SerializedSink;

/// 未指定时的 multicast 积压容量
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// 无界 replay 日志的扩容步长
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// sink 的 flavor 与策略，构建后不可变
pub enum Flavor<T> {
    Unicast {
        queue: QueueDiscipline<T>,
        on_terminate: Option<EndCallback>,
    },
    UnicastNoBackpressure,
    Multicast {
        buffer_size: usize,
        auto_cancel: bool,
    },
    MulticastDirect {
        mode: DeliveryMode,
    },
    Replay {
        retention: RetentionPolicy<T>,
    },
}

impl<T> Flavor<T> {
    pub fn label(&self) -> &'static str {
        match self {
            Flavor::Unicast { .. } => "unicast",
            Flavor::UnicastNoBackpressure => "unicast_no_backpressure",
            Flavor::Multicast { .. } => "multicast",
            Flavor::MulticastDirect { mode } => mode.as_str(),
            Flavor::Replay { retention } => retention.label(),
        }
    }
}

impl<T> fmt::Debug for Flavor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flavor::Unicast {
                queue,
                on_terminate,
            } => f
                .debug_struct("Unicast")
                .field("queue", queue)
                .field("on_terminate", &on_terminate.is_some())
                .finish(),
            Flavor::UnicastNoBackpressure => f.write_str("UnicastNoBackpressure"),
            Flavor::Multicast {
                buffer_size,
                auto_cancel,
            } => f
                .debug_struct("Multicast")
                .field("buffer_size", buffer_size)
                .field("auto_cancel", auto_cancel)
                .finish(),
            Flavor::MulticastDirect { mode } => {
                f.debug_struct("MulticastDirect").field("mode", mode).finish()
            }
            Flavor::Replay { retention } => {
                f.debug_struct("Replay").field("retention", retention).finish()
            }
        }
    }
}

/// 同一族规格共享的安全模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkSpec {
    serialized: bool,
}

impl SinkSpec {
    pub const fn new(serialized: bool) -> Self {
        Self { serialized }
    }

    pub fn is_serialized(&self) -> bool {
        self.serialized
    }

    /// 分配 flavor，serialized 时包装 guard
    pub fn build<T: Clone + Send + Sync + 'static>(&self, flavor: Flavor<T>) -> Many<T> {
        let label = flavor.label();
        let sink: Many<T> = match flavor {
            Flavor::Unicast {
                queue,
                on_terminate,
            } => Arc::new(UnicastSink::new(queue, on_terminate)),
            Flavor::UnicastNoBackpressure => Arc::new(UnicastDirectSink::new()),
            Flavor::Multicast {
                buffer_size,
                auto_cancel,
            } => Arc::new(MulticastSink::new(buffer_size, auto_cancel)),
            Flavor::MulticastDirect { mode } => Arc::new(DirectSink::new(mode)),
            Flavor::Replay { retention } => Arc::new(ReplaySink::new(retention)),
        };
        debug!(flavor = label, serialized = self.serialized, "sink built");
        if self.serialized {
            Arc::new(SerializedSink::new(sink))
        } else {
            sink
        }
    }
}

pub static SAFE_MANY: ManySpec = ManySpec::new(true);
pub static UNSAFE_MANY: ManySpec = ManySpec::new(false);
pub static SAFE_UNICAST: UnicastSpec = UnicastSpec(SinkSpec::new(true));
pub static UNSAFE_UNICAST: UnicastSpec = UnicastSpec(SinkSpec::new(false));
pub static SAFE_MULTICAST: MulticastSpec = MulticastSpec(SinkSpec::new(true));
pub static UNSAFE_MULTICAST: MulticastSpec = MulticastSpec(SinkSpec::new(false));
pub static SAFE_REPLAY: ReplaySpec = ReplaySpec(SinkSpec::new(true));
pub static UNSAFE_REPLAY: ReplaySpec = ReplaySpec(SinkSpec::new(false));

/// 入口
pub struct Sinks;

impl Sinks {
    /// safe 的多订阅者规格
    pub fn many() -> &'static ManySpec {
        &SAFE_MANY
    }
}

/// 某一安全模式下的族选择器
#[derive(Debug)]
pub struct ManySpec {
    spec: SinkSpec,
}

impl ManySpec {
    const fn new(serialized: bool) -> Self {
        Self {
            spec: SinkSpec::new(serialized),
        }
    }

    /// 不带 serialization guard 的同族规格
    pub fn unsafe_(&self) -> &'static ManySpec {
        &UNSAFE_MANY
    }

    pub fn is_serialized(&self) -> bool {
        self.spec.serialized
    }

    pub fn unicast(&self) -> &'static UnicastSpec {
        if self.spec.serialized {
            &SAFE_UNICAST
        } else {
            &UNSAFE_UNICAST
        }
    }

    pub fn multicast(&self) -> &'static MulticastSpec {
        if self.spec.serialized {
            &SAFE_MULTICAST
        } else {
            &UNSAFE_MULTICAST
        }
    }

    pub fn replay(&self) -> &'static ReplaySpec {
        if self.spec.serialized {
            &SAFE_REPLAY
        } else {
            &UNSAFE_REPLAY
        }
    }
}

/// 单订阅者 sink
#[derive(Debug)]
pub struct UnicastSpec(SinkSpec);

impl UnicastSpec {
    /// 无界缓冲，直到订阅者请求
    pub fn on_backpressure_buffer<T: Clone + Send + Sync + 'static>(&self) -> Many<T> {
        self.on_backpressure_buffer_with(QueueDiscipline::Unbounded)
    }

    pub fn on_backpressure_buffer_with<T: Clone + Send + Sync + 'static>(
        &self,
        queue: QueueDiscipline<T>,
    ) -> Many<T> {
        self.0.build(Flavor::Unicast {
            queue,
            on_terminate: None,
        })
    }

    /// `end_callback` 在终止后排空或被取消时执行一次
    pub fn on_backpressure_buffer_with_callback<T: Clone + Send + Sync + 'static>(
        &self,
        queue: QueueDiscipline<T>,
        end_callback: impl FnOnce() + Send + 'static,
    ) -> Many<T> {
        self.0.build(Flavor::Unicast {
            queue,
            on_terminate: Some(Box::new(end_callback)),
        })
    }

    /// 无缓冲；订阅者没有 demand 时 emit 失败
    pub fn on_backpressure_error<T: Clone + Send + Sync + 'static>(&self) -> Many<T> {
        self.0.build(Flavor::UnicastNoBackpressure)
    }
}

/// 不保留历史的多订阅者 sink
#[derive(Debug)]
pub struct MulticastSpec(SinkSpec);

impl MulticastSpec {
    pub fn on_backpressure_buffer<T: Clone + Send + Sync + 'static>(&self) -> Many<T> {
        self.on_backpressure_buffer_with(DEFAULT_BUFFER_SIZE, true)
    }

    pub fn on_backpressure_buffer_sized<T: Clone + Send + Sync + 'static>(
        &self,
        buffer_size: usize,
    ) -> Many<T> {
        self.on_backpressure_buffer_with(buffer_size, true)
    }

    /// # Panics
    /// `buffer_size` 为 0 时。
    pub fn on_backpressure_buffer_with<T: Clone + Send + Sync + 'static>(
        &self,
        buffer_size: usize,
        auto_cancel: bool,
    ) -> Many<T> {
        self.0.build(Flavor::Multicast {
            buffer_size,
            auto_cancel,
        })
    }

    pub fn direct_all_or_nothing<T: Clone + Send + Sync + 'static>(&self) -> Many<T> {
        self.0.build(Flavor::MulticastDirect {
            mode: DeliveryMode::AllOrNothing,
        })
    }

    pub fn direct_best_effort<T: Clone + Send + Sync + 'static>(&self) -> Many<T> {
        self.0.build(Flavor::MulticastDirect {
            mode: DeliveryMode::BestEffort,
        })
    }
}

/// 向后来的订阅者重放历史的多订阅者 sink
#[derive(Debug)]
pub struct ReplaySpec(SinkSpec);

impl ReplaySpec {
    pub fn all<T: Clone + Send + Sync + 'static>(&self) -> Many<T> {
        self.all_batched(DEFAULT_BATCH_SIZE)
    }

    pub fn all_batched<T: Clone + Send + Sync + 'static>(&self, batch_size: usize) -> Many<T> {
        self.retain(RetentionPolicy::Unbounded { batch_size })
    }

    pub fn latest<T: Clone + Send + Sync + 'static>(&self) -> Many<T> {
        self.retain(RetentionPolicy::Latest { default: None })
    }

    pub fn latest_or_default<T: Clone + Send + Sync + 'static>(&self, value: T) -> Many<T> {
        self.retain(RetentionPolicy::Latest {
            default: Some(value),
        })
    }

    pub fn limit<T: Clone + Send + Sync + 'static>(&self, history_size: usize) -> Many<T> {
        self.retain(RetentionPolicy::Count { history_size })
    }

    pub fn limit_age<T: Clone + Send + Sync + 'static>(&self, max_age: Duration) -> Many<T> {
        self.retain(RetentionPolicy::Age(AgeBound::new(max_age)))
    }

    pub fn limit_age_with<T: Clone + Send + Sync + 'static>(
        &self,
        max_age: Duration,
        clock: SharedTimeSource,
        scheduler: Option<Handle>,
    ) -> Many<T> {
        self.retain(RetentionPolicy::Age(AgeBound {
            max_age,
            clock,
            scheduler,
        }))
    }

    pub fn limit_both<T: Clone + Send + Sync + 'static>(
        &self,
        history_size: usize,
        max_age: Duration,
    ) -> Many<T> {
        self.retain(RetentionPolicy::CountAndAge {
            history_size,
            age: AgeBound::new(max_age),
        })
    }

    pub fn limit_both_with<T: Clone + Send + Sync + 'static>(
        &self,
        history_size: usize,
        max_age: Duration,
        clock: SharedTimeSource,
        scheduler: Option<Handle>,
    ) -> Many<T> {
        self.retain(RetentionPolicy::CountAndAge {
            history_size,
            age: AgeBound {
                max_age,
                clock,
                scheduler,
            },
        })
    }

    fn retain<T: Clone + Send + Sync + 'static>(&self, retention: RetentionPolicy<T>) -> Many<T> {
        self.0.build(Flavor::Replay { retention })
    }
}
