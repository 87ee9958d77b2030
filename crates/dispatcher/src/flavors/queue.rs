//! 缓冲 unicast flavor 的队列策略
//!
//! 有界队列使用 `HeapRb`，无界队列使用 `VecDeque`。
//! 调用方可通过 `SinkQueue` 接入自定义实现。

use std::collections::VecDeque;
use std::fmt;

use ringbuf::{traits::*, HeapRb};

/// unicast 积压队列 (单消费者 FIFO)
pub trait SinkQueue<T>: Send {
    /// 入队；队列已满时把值交还给调用方
    fn offer(&mut self, value: T) -> Result<(), T>;

    fn poll(&mut self) -> Option<T>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 无界时为 `None`
    fn capacity(&self) -> Option<usize>;

    fn clear(&mut self) {
        while self.poll().is_some() {}
    }
}

impl<T: Send> SinkQueue<T> for VecDeque<T> {
    fn offer(&mut self, value: T) -> Result<(), T> {
        self.push_back(value);
        Ok(())
    }

    fn poll(&mut self) -> Option<T> {
        self.pop_front()
    }

    fn len(&self) -> usize {
        VecDeque::len(self)
    }

    fn capacity(&self) -> Option<usize> {
        None
    }

    fn clear(&mut self) {
        VecDeque::clear(self);
    }
}

/// 固定容量的环形缓冲队列
pub struct BoundedQueue<T> {
    ring: HeapRb<T>,
}

impl<T> BoundedQueue<T> {
    /// # Panics
    /// `capacity` 为 0 时。
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "bounded queue capacity must be > 0");
        Self {
            ring: HeapRb::new(capacity),
        }
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.ring.occupied_len())
            .field("capacity", &self.ring.capacity())
            .finish()
    }
}

impl<T: Send> SinkQueue<T> for BoundedQueue<T> {
    #[inline]
    fn offer(&mut self, value: T) -> Result<(), T> {
        self.ring.try_push(value)
    }

    #[inline]
    fn poll(&mut self) -> Option<T> {
        self.ring.try_pop()
    }

    #[inline]
    fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    fn capacity(&self) -> Option<usize> {
        Some(Observer::capacity(&self.ring).get())
    }

    fn clear(&mut self) {
        Consumer::clear(&mut self.ring);
    }
}

/// unicast sink 为订阅者缓冲数据的方式
pub enum QueueDiscipline<T> {
    /// 无界增长
    Unbounded,
    /// 固定容量环形缓冲
    Bounded(usize),
    /// 调用方提供的队列
    Custom(Box<dyn SinkQueue<T>>),
}

impl<T> Default for QueueDiscipline<T> {
    fn default() -> Self {
        QueueDiscipline::Unbounded
    }
}

impl<T: Send + 'static> QueueDiscipline<T> {
    pub(crate) fn into_queue(self) -> Box<dyn SinkQueue<T>> {
        match self {
            QueueDiscipline::Unbounded => Box::new(VecDeque::new()),
            QueueDiscipline::Bounded(capacity) => Box::new(BoundedQueue::new(capacity)),
            QueueDiscipline::Custom(queue) => queue,
        }
    }
}

impl<T> fmt::Debug for QueueDiscipline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueDiscipline::Unbounded => f.write_str("Unbounded"),
            QueueDiscipline::Bounded(capacity) => f.debug_tuple("Bounded").field(capacity).finish(),
            QueueDiscipline::Custom(queue) => f
                .debug_struct("Custom")
                .field("capacity", &queue.capacity())
                .finish(),
        }
    }
}
