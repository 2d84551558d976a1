//! Sync tick and quality contracts produced by the sync manager

use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// Result of one trigger-loop iteration
///
/// A latency of `None` means that arm returned an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncTick {
    /// Monotonically increasing, first tick is 1
    pub sequence: u64,
    /// Instant the tick was dispatched
    pub timestamp: Timestamp,
    /// Camera trigger call latency
    pub camera_latency_ms: Option<f64>,
    /// Sensor request call latency
    pub sensor_latency_ms: Option<f64>,
}

impl SyncTick {
    /// Both arms responded without error
    pub fn is_successful(&self) -> bool {
        matches!(
            (self.camera_latency_ms, self.sensor_latency_ms),
            (Some(c), Some(s)) if c >= 0.0 && s >= 0.0
        )
    }

    /// `|camera - sensor|` for successful ticks
    pub fn sync_error_ms(&self) -> Option<f64> {
        match (self.camera_latency_ms, self.sensor_latency_ms) {
            (Some(c), Some(s)) if self.is_successful() => Some((c - s).abs()),
            _ => None,
        }
    }
}

/// Qualitative synchronization grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityScore {
    Excellent,
    Good,
    Poor,
}

impl QualityScore {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Poor => "poor",
        }
    }
}

impl std::fmt::Display for QualityScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate quality over all ticks of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncQualityMetrics {
    pub average_camera_latency_ms: f64,
    pub average_sensor_latency_ms: f64,
    pub max_sync_error_ms: f64,
    /// Fraction 0.0-1.0
    pub sync_success_rate: f64,
    pub sync_quality_score: QualityScore,
}

impl Default for SyncQualityMetrics {
    fn default() -> Self {
        Self {
            average_camera_latency_ms: 0.0,
            average_sensor_latency_ms: 0.0,
            max_sync_error_ms: 0.0,
            sync_success_rate: 0.0,
            sync_quality_score: QualityScore::Poor,
        }
    }
}

/// min/max/avg/std over a set of latencies
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyDistribution {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub std: f64,
}

/// Histogram of per-tick sync error
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncErrorDistribution {
    pub below_1ms: u64,
    #[serde(rename = "1_to_3ms")]
    pub one_to_3ms: u64,
    pub above_3ms: u64,
}

impl SyncErrorDistribution {
    /// Bucket one sync error sample
    pub fn record(&mut self, error_ms: f64) {
        if error_ms < 1.0 {
            self.below_1ms += 1;
        } else if error_ms <= 3.0 {
            self.one_to_3ms += 1;
        } else {
            self.above_3ms += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.below_1ms + self.one_to_3ms + self.above_3ms
    }
}

/// Latency distribution block of the session metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatistics {
    pub camera_latency: LatencyDistribution,
    pub sensor_latency: LatencyDistribution,
    pub sync_error_distribution: SyncErrorDistribution,
}

/// Counters and aggregates exposed by the sync manager after a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub total_ticks: u64,
    pub successful_ticks: u64,
    pub quality: SyncQualityMetrics,
    pub statistics: SyncStatistics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TimeBase;

    fn tick(camera: Option<f64>, sensor: Option<f64>) -> SyncTick {
        SyncTick {
            sequence: 1,
            timestamp: TimeBase::new().now(),
            camera_latency_ms: camera,
            sensor_latency_ms: sensor,
        }
    }

    #[test]
    fn test_tick_success_requires_both_arms() {
        assert!(tick(Some(0.4), Some(1.0)).is_successful());
        assert!(!tick(None, Some(1.0)).is_successful());
        assert!(!tick(Some(0.4), None).is_successful());
        assert!(!tick(Some(-1.0), Some(1.0)).is_successful());
    }

    #[test]
    fn test_sync_error_is_absolute_difference() {
        let err = tick(Some(1.5), Some(4.0)).sync_error_ms().unwrap();
        assert!((err - 2.5).abs() < 1e-12);
        assert_eq!(tick(None, Some(4.0)).sync_error_ms(), None);
    }

    #[test]
    fn test_error_buckets() {
        let mut dist = SyncErrorDistribution::default();
        for e in [0.2, 0.99, 1.0, 3.0, 3.01, 12.0] {
            dist.record(e);
        }
        assert_eq!(dist.below_1ms, 2);
        assert_eq!(dist.one_to_3ms, 2);
        assert_eq!(dist.above_3ms, 2);
        assert_eq!(dist.total(), 6);

        let json = serde_json::to_value(dist).unwrap();
        assert_eq!(json["1_to_3ms"], 2);
    }

    #[test]
    fn test_score_serializes_lowercase() {
        let json = serde_json::to_string(&QualityScore::Excellent).unwrap();
        assert_eq!(json, "\"excellent\"");
    }
}
