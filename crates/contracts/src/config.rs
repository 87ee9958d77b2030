//! SinkBlueprint - Config Loader 输出
//!
//! 描述一组 sink 的声明式配置：安全模式、flavor、背压与保留策略参数。

use serde::{Deserialize, Serialize};
use validator::Validate;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的 sink 配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// sink 定义列表
    #[validate(nested)]
    pub sinks: Vec<SinkConfig>,
}

/// 安全模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyMode {
    /// 由 serialization guard 包装，允许多生产者并发调用
    #[default]
    Safe,
    /// 裸 flavor，调用方保证同一时刻至多一个调用
    Unsafe,
}

impl SafetyMode {
    pub fn is_serialized(self) -> bool {
        matches!(self, SafetyMode::Safe)
    }
}

/// Sink flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlavorKind {
    /// 单订阅者，带缓冲队列
    Unicast,
    /// 单订阅者，无缓冲
    UnicastNoBackpressure,
    /// 多订阅者，共享有界 backlog
    Multicast,
    /// 多订阅者直连：全部送达或全部失败
    DirectAllOrNothing,
    /// 多订阅者直连：尽力送达
    DirectBestEffort,
    /// 回放全部历史
    ReplayAll,
    /// 按数量和/或时间限制回放
    ReplayLimit,
    /// 仅回放最新值
    ReplayLatest,
}

impl FlavorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FlavorKind::Unicast => "unicast",
            FlavorKind::UnicastNoBackpressure => "unicast_no_backpressure",
            FlavorKind::Multicast => "multicast",
            FlavorKind::DirectAllOrNothing => "direct_all_or_nothing",
            FlavorKind::DirectBestEffort => "direct_best_effort",
            FlavorKind::ReplayAll => "replay_all",
            FlavorKind::ReplayLimit => "replay_limit",
            FlavorKind::ReplayLatest => "replay_latest",
        }
    }
}

/// 单个 sink 配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    /// Sink 名称
    #[validate(length(min = 1, message = "sink name cannot be empty"))]
    pub name: String,

    /// 安全模式
    #[serde(default)]
    pub mode: SafetyMode,

    /// Flavor
    pub flavor: FlavorKind,

    /// unicast 有界队列容量 (缺省为无界)
    #[serde(default)]
    #[validate(range(min = 1))]
    pub queue_capacity: Option<usize>,

    /// multicast backlog 容量 (建议为 2 的幂)
    #[serde(default)]
    #[validate(range(min = 1))]
    pub buffer_size: Option<usize>,

    /// 所有订阅者离开后自动取消
    #[serde(default)]
    pub auto_cancel: Option<bool>,

    /// replay_all 内部分批大小
    #[serde(default)]
    #[validate(range(min = 1))]
    pub batch_size: Option<usize>,

    /// replay 保留条数上限
    #[serde(default)]
    #[validate(range(min = 1))]
    pub history_size: Option<usize>,

    /// replay 保留时长上限 (毫秒)
    #[serde(default)]
    #[validate(range(min = 1))]
    pub max_age_ms: Option<u64>,

    /// 是否在调度器上周期性清理过期条目
    #[serde(default)]
    pub scheduled_eviction: bool,

    /// replay_latest 的预置默认值
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
}

impl SinkConfig {
    /// 最小配置：仅名称与 flavor，其余取默认
    pub fn new(name: impl Into<String>, flavor: FlavorKind) -> Self {
        Self {
            name: name.into(),
            mode: SafetyMode::default(),
            flavor,
            queue_capacity: None,
            buffer_size: None,
            auto_cancel: None,
            batch_size: None,
            history_size: None,
            max_age_ms: None,
            scheduled_eviction: false,
            default_value: None,
        }
    }

    /// 已设置的参数名 (用于校验参数与 flavor 是否匹配)
    pub fn configured_knobs(&self) -> Vec<&'static str> {
        let mut knobs = Vec::new();
        if self.queue_capacity.is_some() {
            knobs.push("queue_capacity");
        }
        if self.buffer_size.is_some() {
            knobs.push("buffer_size");
        }
        if self.auto_cancel.is_some() {
            knobs.push("auto_cancel");
        }
        if self.batch_size.is_some() {
            knobs.push("batch_size");
        }
        if self.history_size.is_some() {
            knobs.push("history_size");
        }
        if self.max_age_ms.is_some() {
            knobs.push("max_age_ms");
        }
        if self.scheduled_eviction {
            knobs.push("scheduled_eviction");
        }
        if self.default_value.is_some() {
            knobs.push("default_value");
        }
        knobs
    }
}
