//! 各 flavor 实现
//!
//! 每个 flavor 都是单生产者 sink：除非由
//! [`SerializedSink`](crate::SerializedSink) 包装，否则调用方不得并发调用
//! `try_emit_*`。并发调用时内部状态仍然内存安全，
//! 只是可观察到的顺序没有保证。

mod direct;
mod inner;
mod multicast;
mod queue;
mod replay;
mod unicast;
mod unicast_direct;

pub use direct::{DeliveryMode, DirectSink};
pub use multicast::MulticastSink;
pub use queue::{BoundedQueue, QueueDiscipline, SinkQueue};
pub use replay::{AgeBound, ReplaySink, RetentionPolicy};
pub use unicast::{EndCallback, UnicastSink};
pub use unicast_direct::UnicastDirectSink;

#[cfg(test)]
pub(crate) use inner::test_support;
