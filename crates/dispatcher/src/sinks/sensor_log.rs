//! SensorLogWriter - sensor readings as a JSON array, plus a CSV in synchronized mode
//!
//! JSON is flushed every `flush_every` records. The CSV only holds readings
//! that carry a sequence and is flushed per row.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use contracts::{ContractError, RecordSink, SensorRange, SensorReading, SensorSummary};
use observability::RunningStats;
use tracing::{debug, info, instrument};

use super::create_with_header;
use crate::error::DispatcherError;

/// CSV header, column order matches [`csv_row`]
pub const SENSOR_CSV_HEADER: &str = "sequence,timestamp,temperature,humidity,light_level,\
accel_x,accel_y,accel_z,gyro_x,gyro_y,gyro_z,mag_x,mag_y,mag_z,roll,pitch,yaw,processing_delay_ms";

/// Default JSON batch size
pub const DEFAULT_FLUSH_EVERY: usize = 10;

#[derive(Debug, Default, Clone)]
struct EnvironmentStats {
    temperature: RunningStats,
    humidity: RunningStats,
    light_level: RunningStats,
}

impl EnvironmentStats {
    fn push(&mut self, reading: &SensorReading) {
        self.temperature.push(reading.temperature);
        self.humidity.push(reading.humidity);
        self.light_level.push(reading.light_level);
    }

    fn summary(&self) -> SensorSummary {
        SensorSummary {
            temperature: range(&self.temperature),
            humidity: range(&self.humidity),
            light_level: range(&self.light_level),
        }
    }
}

fn range(stats: &RunningStats) -> SensorRange {
    if stats.count() == 0 {
        return SensorRange::default();
    }
    SensorRange {
        min: Some(stats.min()),
        max: Some(stats.max()),
        avg: Some(stats.mean()),
    }
}

/// Sensor log writer
pub struct SensorLogWriter {
    name: String,
    json_path: PathBuf,
    json: Option<BufWriter<File>>,
    csv_path: Option<PathBuf>,
    csv: Option<BufWriter<File>>,
    pending: Vec<SensorReading>,
    flush_every: usize,
    /// Records already serialized into the JSON array
    written: u64,
    csv_rows: u64,
    stats: EnvironmentStats,
}

impl SensorLogWriter {
    /// Open the JSON array and, in synchronized mode, the CSV mirror
    #[instrument(
        name = "sensor_log_create",
        skip_all,
        fields(json = %json_path.as_ref().display(), csv = csv_path.is_some())
    )]
    pub fn create(
        json_path: impl AsRef<Path>,
        csv_path: Option<&Path>,
        flush_every: usize,
    ) -> Result<Self, DispatcherError> {
        let json_path = json_path.as_ref().to_path_buf();
        let json = create_with_header("sensor_log", &json_path, |w| w.write_all(b"[\n"))?;
        let csv = csv_path
            .map(|path| {
                create_with_header("sensor_csv", path, |w| writeln!(w, "{SENSOR_CSV_HEADER}"))
            })
            .transpose()?;

        info!(path = %json_path.display(), "Sensor log started");
        Ok(Self {
            name: "sensor_log".to_string(),
            json_path,
            json: Some(json),
            csv_path: csv_path.map(Path::to_path_buf),
            csv,
            pending: Vec::with_capacity(flush_every.max(1)),
            flush_every: flush_every.max(1),
            written: 0,
            csv_rows: 0,
            stats: EnvironmentStats::default(),
        })
    }

    pub fn json_path(&self) -> &Path {
        &self.json_path
    }

    pub fn csv_path(&self) -> Option<&Path> {
        self.csv_path.as_deref()
    }

    /// Readings accepted so far, including those still buffered
    pub fn record_count(&self) -> u64 {
        self.written + self.pending.len() as u64
    }

    /// Rows mirrored to the CSV
    pub fn csv_row_count(&self) -> u64 {
        self.csv_rows
    }

    /// min / max / avg of temperature, humidity and light level
    pub fn summary(&self) -> SensorSummary {
        self.stats.summary()
    }

    fn push(&mut self, reading: &SensorReading) -> std::io::Result<()> {
        if self.json.is_none() {
            return Err(std::io::Error::other("sensor log already closed"));
        }

        self.stats.push(reading);

        if let (Some(sequence), Some(csv)) = (reading.sequence, self.csv.as_mut()) {
            writeln!(csv, "{}", csv_row(sequence, reading))?;
            csv.flush()?;
            self.csv_rows += 1;
        }

        self.pending.push(reading.clone());
        if self.pending.len() >= self.flush_every {
            self.flush_pending()?;
        }
        Ok(())
    }

    fn flush_pending(&mut self) -> std::io::Result<()> {
        let Some(json) = self.json.as_mut() else {
            return Ok(());
        };
        for reading in self.pending.drain(..) {
            if self.written > 0 {
                json.write_all(b",\n")?;
            }
            serde_json::to_writer_pretty(&mut *json, &reading)?;
            self.written += 1;
        }
        json.flush()?;
        debug!(written = self.written, "Sensor log batch flushed");
        Ok(())
    }

    fn finish(&mut self) -> std::io::Result<()> {
        if self.json.is_none() {
            return Ok(());
        }
        self.flush_pending()?;
        if let Some(mut json) = self.json.take() {
            json.write_all(b"\n]")?;
            json.flush()?;
        }
        if let Some(mut csv) = self.csv.take() {
            csv.flush()?;
        }
        info!(
            path = %self.json_path.display(),
            records = self.written,
            csv_rows = self.csv_rows,
            "Sensor log closed"
        );
        Ok(())
    }

    fn to_contract_error(&self, e: std::io::Error) -> ContractError {
        ContractError::sink_write(&self.name, e.to_string())
    }
}

/// One CSV line for a synchronized reading
pub fn csv_row(sequence: u64, reading: &SensorReading) -> String {
    let imu = &reading.imu;
    format!(
        "{},{},{:.2},{:.2},{:.2},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.3},{:.3},{:.3},{:.2}",
        sequence,
        reading.timestamp.to_iso_millis(),
        reading.temperature,
        reading.humidity,
        reading.light_level,
        imu.accel.x,
        imu.accel.y,
        imu.accel.z,
        imu.gyro.x,
        imu.gyro.y,
        imu.gyro.z,
        imu.mag.x,
        imu.mag.y,
        imu.mag.z,
        imu.euler.roll,
        imu.euler.pitch,
        imu.euler.yaw,
        reading.processing_delay_ms.unwrap_or(0.0),
    )
}

impl RecordSink for SensorLogWriter {
    type Record = SensorReading;

    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, reading: &SensorReading) -> Result<(), ContractError> {
        self.push(reading).map_err(|e| self.to_contract_error(e))
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        self.flush_pending().map_err(|e| self.to_contract_error(e))
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.finish().map_err(|e| self.to_contract_error(e))
    }
}

impl Drop for SensorLogWriter {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{TimeBase, Vector3};

    fn reading(time_base: &TimeBase, sequence: Option<u64>, temperature: f64) -> SensorReading {
        let mut reading = SensorReading::empty(time_base.now());
        reading.sequence = sequence;
        reading.temperature = temperature;
        reading.humidity = 40.0 + temperature / 10.0;
        reading.light_level = 75.0;
        reading.imu.accel = Vector3::new(0.01234, -0.5, 9.80665);
        reading.imu.euler.yaw = 123.4567;
        reading.processing_delay_ms = sequence.map(|_| 1.5);
        reading
    }

    #[tokio::test]
    async fn test_json_array_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensors.json");
        let time_base = TimeBase::new();

        let mut writer = SensorLogWriter::create(&path, None, 10).unwrap();
        for i in 0..25 {
            writer.write(&reading(&time_base, None, 20.0 + i as f64)).await.unwrap();
        }
        assert_eq!(writer.record_count(), 25);

        // Two full batches on disk, the rest still buffered
        let partial = std::fs::read_to_string(&path).unwrap();
        assert_eq!(partial.matches("\"temperature\"").count(), 20);

        writer.close().await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<SensorReading> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.len(), 25);
        assert_eq!(parsed[24].temperature, 44.0);
    }

    #[tokio::test]
    async fn test_empty_log_is_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");

        let mut writer = SensorLogWriter::create(&path, None, DEFAULT_FLUSH_EVERY).unwrap();
        writer.close().await.unwrap();
        writer.close().await.unwrap();

        let parsed: Vec<SensorReading> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(parsed.is_empty());
        assert_eq!(writer.summary(), SensorSummary::default());
    }

    #[tokio::test]
    async fn test_csv_only_synchronized_rows() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("s.json");
        let csv_path = dir.path().join("s.csv");
        let time_base = TimeBase::new();

        let mut writer = SensorLogWriter::create(&json_path, Some(&csv_path), 10).unwrap();
        writer.write(&reading(&time_base, Some(1), 21.0)).await.unwrap();
        writer.write(&reading(&time_base, None, 22.0)).await.unwrap();
        writer.write(&reading(&time_base, Some(3), 23.0)).await.unwrap();

        // CSV rows are visible immediately
        let live = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(live.lines().count(), 3);

        writer.close().await.unwrap();
        assert_eq!(writer.csv_row_count(), 2);
        assert_eq!(writer.record_count(), 3);

        let csv = std::fs::read_to_string(&csv_path).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(SENSOR_CSV_HEADER));
        let row: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(row.len(), 18);
        assert_eq!(row[0], "1");
        assert_eq!(row[2], "21.00");
        assert_eq!(row[5], "0.0123");
        assert_eq!(row[16], "123.457");
        assert_eq!(row[17], "1.50");
        assert!(lines.next().unwrap().starts_with("3,"));
    }

    #[tokio::test]
    async fn test_summary_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let time_base = TimeBase::new();
        let mut writer = SensorLogWriter::create(dir.path().join("r.json"), None, 10).unwrap();

        for temperature in [18.0, 22.0, 26.0] {
            writer.write(&reading(&time_base, None, temperature)).await.unwrap();
        }

        let summary = writer.summary();
        assert_eq!(summary.temperature.min, Some(18.0));
        assert_eq!(summary.temperature.max, Some(26.0));
        assert_eq!(summary.temperature.avg, Some(22.0));
        assert_eq!(summary.light_level.avg, Some(75.0));
    }
}
