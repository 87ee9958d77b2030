//! Sink emission 指标收集模块
//!
//! 记录每次 `try_emit_*` 的结果与耗时，并在内存中按 sink 聚合。

use std::collections::BTreeMap;

use contracts::EmitResult;
use metrics::{counter, gauge, histogram};

/// 记录一次 emission 结果
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_emission;
///
/// let result = sink.try_emit_next(value);
/// record_emission("events", result);
/// ```
pub fn record_emission(sink_name: &str, result: EmitResult) {
    counter!(
        "reactive_sinks_emissions_total",
        "sink" => sink_name.to_string(),
        "result" => result.as_str()
    )
    .increment(1);
}

/// 记录单次 emit 调用耗时 (微秒)
pub fn record_emit_latency_us(sink_name: &str, latency_us: f64) {
    histogram!(
        "reactive_sinks_emit_latency_us",
        "sink" => sink_name.to_string()
    )
    .record(latency_us);
}

/// 记录当前订阅者数量
pub fn record_subscriber_count(sink_name: &str, count: usize) {
    gauge!(
        "reactive_sinks_subscribers",
        "sink" => sink_name.to_string()
    )
    .set(count as f64);
}

/// 单个 sink 的结果计数
#[derive(Debug, Clone, Default)]
pub struct EmissionTally {
    counts: BTreeMap<&'static str, u64>,
    /// emit 耗时统计 (微秒)
    pub latency_us: RunningStats,
}

impl EmissionTally {
    pub fn count(&self, result: EmitResult) -> u64 {
        self.counts.get(result.as_str()).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// 成功率 (百分比)
    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.count(EmitResult::Ok) as f64 / total as f64 * 100.0
        }
    }

    /// 合并另一份计数 (例如多个生产者线程各自统计)
    pub fn merge(&mut self, other: &EmissionTally) {
        for (result, n) in &other.counts {
            *self.counts.entry(result).or_insert(0) += n;
        }
        self.latency_us.merge(&other.latency_us);
    }
}

/// Emission 指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct EmissionAggregator {
    sinks: BTreeMap<String, EmissionTally>,
}

impl EmissionAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, sink_name: &str, result: EmitResult, latency_us: Option<f64>) {
        let tally = self.sinks.entry(sink_name.to_string()).or_default();
        *tally.counts.entry(result.as_str()).or_insert(0) += 1;
        if let Some(us) = latency_us {
            tally.latency_us.push(us);
        }
    }

    /// 合并某个 sink 的计数
    pub fn merge(&mut self, sink_name: &str, tally: &EmissionTally) {
        self.sinks
            .entry(sink_name.to_string())
            .or_default()
            .merge(tally);
    }

    pub fn tally(&self, sink_name: &str) -> Option<&EmissionTally> {
        self.sinks.get(sink_name)
    }

    /// 生成摘要报告
    pub fn summary(&self) -> EmissionSummary {
        EmissionSummary {
            sinks: self
                .sinks
                .iter()
                .map(|(name, tally)| SinkSummary {
                    name: name.clone(),
                    total: tally.total(),
                    success_rate: tally.success_rate(),
                    results: EmitResult::ALL
                        .iter()
                        .map(|r| (r.as_str(), tally.count(*r)))
                        .filter(|(_, n)| *n > 0)
                        .collect(),
                    latency_us: StatsSummary::from(&tally.latency_us),
                })
                .collect(),
        }
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct EmissionSummary {
    pub sinks: Vec<SinkSummary>,
}

/// 单个 sink 摘要
#[derive(Debug, Clone, Default)]
pub struct SinkSummary {
    pub name: String,
    pub total: u64,
    pub success_rate: f64,
    pub results: Vec<(&'static str, u64)>,
    pub latency_us: StatsSummary,
}

impl std::fmt::Display for EmissionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Emission Summary ===")?;
        for sink in &self.sinks {
            writeln!(
                f,
                "{}: {} attempts, {:.2}% ok",
                sink.name, sink.total, sink.success_rate
            )?;
            for (result, count) in &sink.results {
                writeln!(f, "  {result}: {count}")?;
            }
            writeln!(f, "  latency (us): {}", sink.latency_us)?;
        }
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 合并两组统计 (Chan et al. 并行算法)
    pub fn merge(&mut self, other: &RunningStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        self.m2 += other.m2 + delta * delta * (self.count * other.count) as f64 / count as f64;
        self.mean += delta * other.count as f64 / count as f64;
        self.count = count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}
