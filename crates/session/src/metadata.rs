//! Metadata document assembly and persistence

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use contracts::{
    AcquisitionBlueprint, CameraSettingsInfo, HardwareInfo, RecordingMetadata, SyncReport,
    SynchronizationInfo, Timestamp, TimestampInfo,
};
use tracing::info;

use crate::error::{Result, SessionError};

/// Synchronization block from a finished sync run
pub fn synchronization_info(
    rate_hz: f64,
    report: &SyncReport,
    sync_log_file: Option<String>,
) -> SynchronizationInfo {
    SynchronizationInfo {
        method: SynchronizationInfo::METHOD_SOFTWARE_TRIGGER.to_string(),
        master_frequency_hz: rate_hz,
        total_sync_points: report.total_ticks,
        sync_log_file,
        quality_metrics: report.quality,
        statistics: report.statistics,
    }
}

/// Assemble the session document
pub fn build_metadata(
    blueprint: &AcquisitionBlueprint,
    start: &Timestamp,
    end: &Timestamp,
    hardware: HardwareInfo,
    synchronization: Option<SynchronizationInfo>,
) -> RecordingMetadata {
    RecordingMetadata {
        timestamp: TimestampInfo {
            date: start.date_string(),
            start_time: start.time_string(),
            end_time: Some(end.time_string()),
        },
        environment: blueprint.recording.environment.clone(),
        camera_settings: CameraSettingsInfo::from(&blueprint.camera.settings()),
        hardware,
        recording_mode: blueprint.recording.mode,
        synchronization,
    }
}

/// Write the document as indented JSON
pub fn write_metadata(path: &Path, metadata: &RecordingMetadata) -> Result<()> {
    let file = File::create(path).map_err(|e| SessionError::storage(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, metadata)
        .map_err(|e| SessionError::metadata(path, e.to_string()))?;
    writer
        .flush()
        .map_err(|e| SessionError::storage(path, e))?;

    info!(path = %path.display(), "Metadata saved");
    Ok(())
}

/// Read a previously written document
pub fn read_metadata(path: &Path) -> Result<RecordingMetadata> {
    let file = File::open(path).map_err(|e| SessionError::storage(path, e))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| SessionError::metadata(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{RecordingMode, SyncQualityMetrics, SyncStatistics};

    fn timestamp(raw: &str) -> Timestamp {
        serde_json::from_str(&format!("\"{raw}\"")).unwrap()
    }

    fn report(total: u64) -> SyncReport {
        SyncReport {
            total_ticks: total,
            successful_ticks: total,
            quality: SyncQualityMetrics::default(),
            statistics: SyncStatistics::default(),
        }
    }

    #[test]
    fn test_build_continuous_has_no_sync_block() {
        let blueprint = AcquisitionBlueprint::default();
        let md = build_metadata(
            &blueprint,
            &timestamp("2025-06-01T08:15:30.000001"),
            &timestamp("2025-06-01T08:20:00.5"),
            HardwareInfo::default(),
            None,
        );
        assert_eq!(md.timestamp.date, "2025-06-01");
        assert_eq!(md.timestamp.start_time, "08:15:30");
        assert_eq!(md.timestamp.end_time.as_deref(), Some("08:20:00"));
        assert_eq!(md.recording_mode, RecordingMode::Continuous);

        let json = serde_json::to_value(&md).unwrap();
        assert!(json.get("synchronization").is_none());
        assert_eq!(json["camera_settings"]["exposure_time"], 5000);
    }

    #[test]
    fn test_sync_block_and_roundtrip_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("meta.json");
        let mut blueprint = AcquisitionBlueprint::default();
        blueprint.recording.mode = RecordingMode::Synchronized;

        let sync = synchronization_info(30.0, &report(100), Some("x_sensors.csv".to_string()));
        assert_eq!(sync.method, "software_trigger_30hz");
        assert_eq!(sync.total_sync_points, 100);

        let start = timestamp("2025-06-01T08:15:30.0");
        let md = build_metadata(&blueprint, &start, &start, HardwareInfo::default(), Some(sync));
        write_metadata(&path, &md).unwrap();

        let loaded = read_metadata(&path).unwrap();
        assert_eq!(loaded, md);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"master_frequency_hz\": 30.0"));
    }

    #[test]
    fn test_write_into_missing_dir_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = write_metadata(
            &tmp.path().join("missing/meta.json"),
            &build_metadata(
                &AcquisitionBlueprint::default(),
                &Timestamp::system_now(),
                &Timestamp::system_now(),
                HardwareInfo::default(),
                None,
            ),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Storage { .. }));
    }
}
