//! 配置校验模块
//!
//! 校验规则：
//! - 字段级规则 (`validator` derive)：名称非空、尺寸 > 0
//! - sink name 唯一
//! - 参数必须适用于所选 flavor
//! - replay_limit 至少设置 history_size 或 max_age_ms
//! - scheduled_eviction 需要 max_age_ms
//!
//! 警告 (不阻断加载)：
//! - buffer_size 不是 2 的幂

use std::collections::HashSet;

use contracts::{ContractError, FlavorKind, SinkBlueprint, SinkConfig};
use validator::Validate;

/// 校验 SinkBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &SinkBlueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_sink_names(blueprint)?;
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        validate_knobs(idx, sink)?;
        validate_replay_limit(idx, sink)?;
    }
    Ok(())
}

/// 收集非致命的配置警告
pub fn warnings(blueprint: &SinkBlueprint) -> Vec<String> {
    blueprint
        .sinks
        .iter()
        .filter_map(|sink| match sink.buffer_size {
            Some(size) if !size.is_power_of_two() => Some(format!(
                "sink '{}': buffer_size {} is not a power of two",
                sink.name, size
            )),
            _ => None,
        })
        .collect()
}

/// 各 flavor 接受的参数
pub fn applicable_knobs(flavor: FlavorKind) -> &'static [&'static str] {
    match flavor {
        FlavorKind::Unicast => &["queue_capacity"],
        FlavorKind::UnicastNoBackpressure
        | FlavorKind::DirectAllOrNothing
        | FlavorKind::DirectBestEffort => &[],
        FlavorKind::Multicast => &["buffer_size", "auto_cancel"],
        FlavorKind::ReplayAll => &["batch_size"],
        FlavorKind::ReplayLimit => &["history_size", "max_age_ms", "scheduled_eviction"],
        FlavorKind::ReplayLatest => &["default_value"],
    }
}

/// 字段级校验 (derive 规则)
fn validate_fields(blueprint: &SinkBlueprint) -> Result<(), ContractError> {
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        sink.validate().map_err(|e| {
            ContractError::config_validation(format!("sinks[{idx}]"), e.to_string())
        })?;
    }
    Ok(())
}

/// 校验 sink name 唯一性
fn validate_sink_names(blueprint: &SinkBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for sink in &blueprint.sinks {
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
    }
    Ok(())
}

/// 校验参数与 flavor 是否匹配
fn validate_knobs(idx: usize, sink: &SinkConfig) -> Result<(), ContractError> {
    let allowed = applicable_knobs(sink.flavor);
    for knob in sink.configured_knobs() {
        if !allowed.contains(&knob) {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].{knob}"),
                format!("'{knob}' does not apply to flavor '{}'", sink.flavor.as_str()),
            ));
        }
    }
    Ok(())
}

fn validate_replay_limit(idx: usize, sink: &SinkConfig) -> Result<(), ContractError> {
    if sink.flavor != FlavorKind::ReplayLimit {
        return Ok(());
    }
    if sink.history_size.is_none() && sink.max_age_ms.is_none() {
        return Err(ContractError::config_validation(
            format!("sinks[{idx}]"),
            "replay_limit requires history_size or max_age_ms",
        ));
    }
    if sink.scheduled_eviction && sink.max_age_ms.is_none() {
        return Err(ContractError::config_validation(
            format!("sinks[{idx}].scheduled_eviction"),
            "scheduled_eviction requires max_age_ms",
        ));
    }
    Ok(())
}
