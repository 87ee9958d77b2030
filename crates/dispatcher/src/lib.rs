//! # Dispatcher
//!
//! Sink 构建与分发模块。
//!
//! 负责：
//! - 按 flavor 与背压/保留策略构建 sink (`Sinks::many()`)
//! - safe 模式下用 serialization guard 包装，支持多生产者
//! - 从声明式 `SinkConfig` 构建 sink

pub mod error;
pub mod factory;
pub mod flavors;
pub mod guard;
pub mod metrics;
pub mod spec;
pub mod stream;

pub use contracts::{EmitResult, Many, ManySink};
pub use error::DispatcherError;
pub use factory::{build_all, build_from_config, flavor_from_config};
pub use flavors::{
    AgeBound, DeliveryMode, EndCallback, QueueDiscipline, RetentionPolicy, SinkQueue,
};
pub use guard::{Admission, SerializationGuard, SerializedSink};
pub use metrics::{GuardMetrics, GuardSnapshot};
pub use spec::{
    Flavor, ManySpec, MulticastSpec, ReplaySpec, SinkSpec, Sinks, UnicastSpec, DEFAULT_BATCH_SIZE,
    DEFAULT_BUFFER_SIZE, SAFE_MANY, SAFE_MULTICAST, SAFE_REPLAY, SAFE_UNICAST, UNSAFE_MANY,
    UNSAFE_MULTICAST, UNSAFE_REPLAY, UNSAFE_UNICAST,
};
pub use stream::ChannelSubscribe;
