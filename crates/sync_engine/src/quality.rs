//! Synchronization quality grading

use contracts::{
    LatencyDistribution, QualityScore, SyncQualityMetrics, SyncReport, SyncStatistics,
};
use observability::{StatsSummary, SyncMetricsAggregator};

/// Max sync error above which a run is at best `good`
pub const GOOD_MAX_ERROR_MS: f64 = 3.0;
/// Max sync error above which a run is `poor`
pub const POOR_MAX_ERROR_MS: f64 = 5.0;
/// Success rate below which a run is at best `good`
pub const GOOD_MIN_SUCCESS_RATE: f64 = 0.98;
/// Success rate below which a run is `poor`
pub const POOR_MIN_SUCCESS_RATE: f64 = 0.95;

/// Grade a run
///
/// `excellent` unless downgraded; `poor` wins over `good`. A run without a
/// single successful tick is `poor`.
pub fn grade(successful_ticks: u64, max_sync_error_ms: f64, success_rate: f64) -> QualityScore {
    if successful_ticks == 0
        || max_sync_error_ms > POOR_MAX_ERROR_MS
        || success_rate < POOR_MIN_SUCCESS_RATE
    {
        QualityScore::Poor
    } else if max_sync_error_ms > GOOD_MAX_ERROR_MS || success_rate < GOOD_MIN_SUCCESS_RATE {
        QualityScore::Good
    } else {
        QualityScore::Excellent
    }
}

pub fn quality_metrics(stats: &SyncMetricsAggregator) -> SyncQualityMetrics {
    let success_rate = stats.success_rate();
    let max_sync_error_ms = stats.max_sync_error_ms();
    SyncQualityMetrics {
        average_camera_latency_ms: stats.camera_latency.mean(),
        average_sensor_latency_ms: stats.sensor_latency.mean(),
        max_sync_error_ms,
        sync_success_rate: success_rate,
        sync_quality_score: grade(stats.successful_ticks, max_sync_error_ms, success_rate),
    }
}

pub fn statistics(stats: &SyncMetricsAggregator) -> SyncStatistics {
    SyncStatistics {
        camera_latency: LatencyDistribution::from(&StatsSummary::from(&stats.camera_latency)),
        sensor_latency: LatencyDistribution::from(&StatsSummary::from(&stats.sensor_latency)),
        sync_error_distribution: stats.error_distribution,
    }
}

pub fn report(stats: &SyncMetricsAggregator) -> SyncReport {
    SyncReport {
        total_ticks: stats.total_ticks,
        successful_ticks: stats.successful_ticks,
        quality: quality_metrics(stats),
        statistics: statistics(stats),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SyncTick, TimeBase};

    #[test]
    fn test_grade_thresholds() {
        assert_eq!(grade(100, 0.5, 1.0), QualityScore::Excellent);
        assert_eq!(grade(100, 3.0, 0.98), QualityScore::Excellent);
        assert_eq!(grade(100, 3.1, 1.0), QualityScore::Good);
        assert_eq!(grade(100, 0.5, 0.97), QualityScore::Good);
        assert_eq!(grade(100, 5.1, 1.0), QualityScore::Poor);
        assert_eq!(grade(100, 0.5, 0.94), QualityScore::Poor);
        assert_eq!(grade(0, 0.0, 0.0), QualityScore::Poor);
    }

    #[test]
    fn test_report_from_ticks() {
        let time_base = TimeBase::new();
        let mut stats = SyncMetricsAggregator::new();
        for sequence in 1..=40 {
            stats.update(&SyncTick {
                sequence,
                timestamp: time_base.now(),
                camera_latency_ms: Some(0.3),
                sensor_latency_ms: Some(1.8),
            });
        }
        stats.update(&SyncTick {
            sequence: 41,
            timestamp: time_base.now(),
            camera_latency_ms: Some(0.3),
            sensor_latency_ms: None,
        });

        let report = report(&stats);
        assert_eq!(report.total_ticks, 41);
        assert_eq!(report.successful_ticks, 40);
        assert!((report.quality.max_sync_error_ms - 1.5).abs() < 1e-9);
        // 40/41 < 0.98
        assert_eq!(report.quality.sync_quality_score, QualityScore::Good);
        assert_eq!(report.statistics.sync_error_distribution.one_to_3ms, 40);
        assert!((report.statistics.sensor_latency.avg - 1.8).abs() < 1e-9);
    }

    #[test]
    fn test_empty_run_is_poor() {
        let metrics = quality_metrics(&SyncMetricsAggregator::new());
        assert_eq!(metrics.sync_quality_score, QualityScore::Poor);
        assert_eq!(metrics.sync_success_rate, 0.0);
    }
}
