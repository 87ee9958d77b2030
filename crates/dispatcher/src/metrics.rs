//! Guard 指标 (用于可观测性)

use std::sync::atomic::{AtomicU64, Ordering};

/// 单个 serialization guard 的计数器
#[derive(Debug, Default)]
pub struct GuardMetrics {
    /// 最外层准入次数
    admitted: AtomicU64,
    /// 当前 owner 的重入次数
    reentrant: AtomicU64,
    /// 以 `FailNonSerialized` 拒绝的调用
    rejected: AtomicU64,
}

impl GuardMetrics {
    /// 创建新的指标实例
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    pub fn inc_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reentrant(&self) -> u64 {
        self.reentrant.load(Ordering::Relaxed)
    }

    pub fn inc_reentrant(&self) {
        self.reentrant.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// 获取所有计数器快照
    pub fn snapshot(&self) -> GuardSnapshot {
        GuardSnapshot {
            admitted: self.admitted(),
            reentrant: self.reentrant(),
            rejected: self.rejected(),
        }
    }
}

/// Guard 计数器快照 (用于报告)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardSnapshot {
    pub admitted: u64,
    pub reentrant: u64,
    pub rejected: u64,
}

impl GuardSnapshot {
    /// 到达 guard 的全部调用
    pub fn attempts(&self) -> u64 {
        self.admitted + self.reentrant + self.rejected
    }
}
