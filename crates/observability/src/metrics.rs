//! 采集指标收集模块
//!
//! 同步 tick、帧编码队列与记录写入的 Prometheus 指标，以及内存中的同步统计聚合。

use contracts::{LatencyDistribution, SyncErrorDistribution, SyncTick};
use metrics::{counter, gauge, histogram};

/// 从 SyncTick 记录指标
///
/// 每个 tick 完成后调用一次。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_sync_tick;
///
/// let tick = manager.run_tick().await;
/// record_sync_tick(&tick);
/// ```
pub fn record_sync_tick(tick: &SyncTick) {
    let status = if tick.is_successful() {
        "success"
    } else {
        "failure"
    };
    counter!("srvs_sync_ticks_total", "status" => status).increment(1);
    gauge!("srvs_sync_last_sequence").set(tick.sequence as f64);

    if let Some(latency) = tick.camera_latency_ms {
        histogram!("srvs_sync_camera_latency_ms").record(latency);
    }
    if let Some(latency) = tick.sensor_latency_ms {
        histogram!("srvs_sync_sensor_latency_ms").record(latency);
    }
    if let Some(error) = tick.sync_error_ms() {
        histogram!("srvs_sync_error_ms").record(error);
    }
}

/// 记录帧进入编码队列
pub fn record_frame_enqueued(queue_depth: usize) {
    counter!("srvs_video_frames_enqueued_total").increment(1);
    gauge!("srvs_video_queue_depth").set(queue_depth as f64);
}

/// 记录帧被丢弃 (reason: rate_limit / queue_full / closed)
pub fn record_frame_dropped(reason: &'static str) {
    counter!("srvs_video_frames_dropped_total", "reason" => reason).increment(1);
}

/// 记录帧写入编码器
pub fn record_frame_encoded(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("srvs_video_frames_encoded_total", "status" => status).increment(1);
}

/// 记录分发到 sink 的记录
pub fn record_record_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "srvs_records_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录 sink 队列深度
pub fn record_sink_queue_depth(sink_name: &str, depth: usize) {
    gauge!(
        "srvs_sink_queue_depth",
        "sink" => sink_name.to_string()
    )
    .set(depth as f64);
}

/// 同步指标聚合器
///
/// 在内存中聚合 tick 结果，延迟统计只计入成功的 tick。
#[derive(Debug, Clone, Default)]
pub struct SyncMetricsAggregator {
    /// 总 tick 数
    pub total_ticks: u64,

    /// 成功 tick 数
    pub successful_ticks: u64,

    /// 相机触发延迟 (ms)
    pub camera_latency: RunningStats,

    /// 传感器请求延迟 (ms)
    pub sensor_latency: RunningStats,

    /// |相机 - 传感器| (ms)
    pub sync_error: RunningStats,

    /// 同步误差分桶
    pub error_distribution: SyncErrorDistribution,
}

impl SyncMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, tick: &SyncTick) {
        self.total_ticks += 1;

        let (Some(camera), Some(sensor), Some(error)) = (
            tick.camera_latency_ms,
            tick.sensor_latency_ms,
            tick.sync_error_ms(),
        ) else {
            return;
        };

        self.successful_ticks += 1;
        self.camera_latency.push(camera);
        self.sensor_latency.push(sensor);
        self.sync_error.push(error);
        self.error_distribution.record(error);
    }

    /// 成功率 (0.0-1.0)
    pub fn success_rate(&self) -> f64 {
        if self.total_ticks == 0 {
            0.0
        } else {
            self.successful_ticks as f64 / self.total_ticks as f64
        }
    }

    /// 最大同步误差，无成功 tick 时为 0
    pub fn max_sync_error_ms(&self) -> f64 {
        if self.sync_error.count() == 0 {
            0.0
        } else {
            self.sync_error.max()
        }
    }

    /// 生成摘要报告
    pub fn summary(&self) -> SyncMetricsSummary {
        SyncMetricsSummary {
            total_ticks: self.total_ticks,
            successful_ticks: self.successful_ticks,
            success_rate: self.success_rate() * 100.0,
            camera_latency_ms: StatsSummary::from(&self.camera_latency),
            sensor_latency_ms: StatsSummary::from(&self.sensor_latency),
            sync_error_ms: StatsSummary::from(&self.sync_error),
            error_distribution: self.error_distribution,
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 同步指标摘要
#[derive(Debug, Clone, Default)]
pub struct SyncMetricsSummary {
    pub total_ticks: u64,
    pub successful_ticks: u64,
    /// 百分比
    pub success_rate: f64,
    pub camera_latency_ms: StatsSummary,
    pub sensor_latency_ms: StatsSummary,
    pub sync_error_ms: StatsSummary,
    pub error_distribution: SyncErrorDistribution,
}

impl std::fmt::Display for SyncMetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Sync Metrics Summary ===")?;
        writeln!(f, "Total ticks: {}", self.total_ticks)?;
        writeln!(
            f,
            "Successful ticks: {} ({:.2}%)",
            self.successful_ticks, self.success_rate
        )?;
        writeln!(f, "Camera latency (ms): {}", self.camera_latency_ms)?;
        writeln!(f, "Sensor latency (ms): {}", self.sensor_latency_ms)?;
        writeln!(f, "Sync error (ms): {}", self.sync_error_ms)?;
        writeln!(
            f,
            "Sync error buckets: <1ms={}, 1-3ms={}, >3ms={}",
            self.error_distribution.below_1ms,
            self.error_distribution.one_to_3ms,
            self.error_distribution.above_3ms
        )?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Copy, Default, PartialEq)]
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

impl From<&StatsSummary> for LatencyDistribution {
    fn from(summary: &StatsSummary) -> Self {
        Self {
            min: summary.min,
            max: summary.max,
            avg: summary.mean,
            std: summary.std_dev,
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
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
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

    /// 方差 (样本方差)
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

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}
