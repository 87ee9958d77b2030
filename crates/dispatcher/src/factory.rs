//! 从声明式 `SinkConfig` 构建 sink

use std::time::Duration;

use contracts::{FlavorKind, Many, SinkBlueprint, SinkConfig};
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tracing::{debug, instrument};

use crate::error::DispatcherError;
use crate::flavors::{AgeBound, DeliveryMode, QueueDiscipline, RetentionPolicy};
use crate::spec::{Flavor, SinkSpec, DEFAULT_BATCH_SIZE, DEFAULT_BUFFER_SIZE};

type Result<T> = std::result::Result<T, DispatcherError>;

/// 构建单个 sink；安全模式决定是否包装 guard
#[instrument(
    name = "dispatcher_build_from_config",
    skip(config),
    fields(sink = %config.name, flavor = config.flavor.as_str())
)]
pub fn build_from_config<T>(config: &SinkConfig) -> Result<Many<T>>
where
    T: Clone + Send + Sync + DeserializeOwned + 'static,
{
    let flavor = flavor_from_config(config)?;
    let spec = SinkSpec::new(config.mode.is_serialized());
    debug!(policy = ?flavor, serialized = spec.is_serialized(), "resolved sink flavor");
    Ok(spec.build(flavor))
}

/// 构建 blueprint 中的全部 sink，保持声明顺序
pub fn build_all<T>(blueprint: &SinkBlueprint) -> Result<Vec<(String, Many<T>)>>
where
    T: Clone + Send + Sync + DeserializeOwned + 'static,
{
    blueprint
        .sinks
        .iter()
        .map(|config| Ok((config.name.clone(), build_from_config(config)?)))
        .collect()
}

/// 把配置映射为 `Flavor`，不分配 sink
pub fn flavor_from_config<T>(config: &SinkConfig) -> Result<Flavor<T>>
where
    T: DeserializeOwned,
{
    reject_zero_sizes(config)?;

    let flavor = match config.flavor {
        FlavorKind::Unicast => Flavor::Unicast {
            queue: match config.queue_capacity {
                Some(capacity) => QueueDiscipline::Bounded(capacity),
                None => QueueDiscipline::Unbounded,
            },
            on_terminate: None,
        },
        FlavorKind::UnicastNoBackpressure => Flavor::UnicastNoBackpressure,
        FlavorKind::Multicast => Flavor::Multicast {
            buffer_size: config.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
            auto_cancel: config.auto_cancel.unwrap_or(true),
        },
        FlavorKind::DirectAllOrNothing => Flavor::MulticastDirect {
            mode: DeliveryMode::AllOrNothing,
        },
        FlavorKind::DirectBestEffort => Flavor::MulticastDirect {
            mode: DeliveryMode::BestEffort,
        },
        FlavorKind::ReplayAll => Flavor::Replay {
            retention: RetentionPolicy::Unbounded {
                batch_size: config.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            },
        },
        FlavorKind::ReplayLimit => Flavor::Replay {
            retention: limit_policy(config)?,
        },
        FlavorKind::ReplayLatest => {
            let default = config
                .default_value
                .clone()
                .map(serde_json::from_value::<T>)
                .transpose()
                .map_err(|source| DispatcherError::DefaultValue {
                    name: config.name.clone(),
                    source,
                })?;
            Flavor::Replay {
                retention: RetentionPolicy::Latest { default },
            }
        }
    };
    Ok(flavor)
}

fn limit_policy<T>(config: &SinkConfig) -> Result<RetentionPolicy<T>> {
    let age = match config.max_age_ms {
        Some(ms) => {
            let mut age = AgeBound::new(Duration::from_millis(ms));
            if config.scheduled_eviction {
                let handle = Handle::try_current().map_err(|_| DispatcherError::NoScheduler {
                    name: config.name.clone(),
                })?;
                age = age.with_scheduler(handle);
            }
            Some(age)
        }
        None if config.scheduled_eviction => {
            return Err(DispatcherError::invalid_config(
                &config.name,
                "scheduled_eviction requires max_age_ms",
            ));
        }
        None => None,
    };

    match (config.history_size, age) {
        (Some(history_size), Some(age)) => Ok(RetentionPolicy::CountAndAge { history_size, age }),
        (Some(history_size), None) => Ok(RetentionPolicy::Count { history_size }),
        (None, Some(age)) => Ok(RetentionPolicy::Age(age)),
        (None, None) => Err(DispatcherError::invalid_config(
            &config.name,
            "replay_limit requires history_size or max_age_ms",
        )),
    }
}

fn reject_zero_sizes(config: &SinkConfig) -> Result<()> {
    let zero = [
        ("queue_capacity", config.queue_capacity == Some(0)),
        ("buffer_size", config.buffer_size == Some(0)),
        ("batch_size", config.batch_size == Some(0)),
        ("history_size", config.history_size == Some(0)),
        ("max_age_ms", config.max_age_ms == Some(0)),
    ];
    match zero.iter().find(|(_, is_zero)| *is_zero) {
        Some((field, _)) => Err(DispatcherError::invalid_config(
            &config.name,
            format!("{field} must be > 0"),
        )),
        None => Ok(()),
    }
}
