//! Dispatcher 错误类型

use thiserror::Error;

/// 从声明式配置构建 sink 时的错误
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// 在 tokio runtime 之外请求了定时淘汰
    #[error("sink '{name}': scheduled_eviction requires a running tokio runtime")]
    NoScheduler { name: String },

    /// `default_value` 无法解码为 sink 的值类型
    #[error("sink '{name}': invalid default_value: {source}")]
    DefaultValue {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// flavor 无法满足的参数组合
    #[error("sink '{name}': {message}")]
    InvalidConfig { name: String, message: String },
}

impl DispatcherError {
    pub fn invalid_config(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            name: name.into(),
            message: message.into(),
        }
    }
}
