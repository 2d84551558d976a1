//! GpxTrackWriter - GPX 1.1 track log, one track per session

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use contracts::{ContractError, GpsFix, RecordSink};

use super::create_with_header;
use crate::error::DispatcherError;
use tracing::{debug, info, instrument};

const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";
const GPX_CREATOR: &str = "SrVsDataset";

/// Writes `gpx > trk > trkseg > trkpt` as fixes arrive
///
/// Every point is flushed so a crash loses at most the closing tags.
pub struct GpxTrackWriter {
    name: String,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    point_count: u64,
}

impl GpxTrackWriter {
    /// Create the file and write the document header
    #[instrument(name = "gpx_create", skip(track_name), fields(path = %path.as_ref().display()))]
    pub fn create(path: impl AsRef<Path>, track_name: &str) -> Result<Self, DispatcherError> {
        let path = path.as_ref().to_path_buf();
        let writer = create_with_header("gpx", &path, |w| {
            writeln!(w, r#"<?xml version="1.0" encoding="utf-8"?>"#)?;
            writeln!(
                w,
                r#"<gpx xmlns="{GPX_NAMESPACE}" version="1.1" creator="{GPX_CREATOR}">"#
            )?;
            writeln!(w, "  <trk>")?;
            writeln!(w, "    <name>{}</name>", escape_xml(track_name))?;
            writeln!(w, "    <trkseg>")
        })?;

        info!(path = %path.display(), "GPX track started");
        Ok(Self {
            name: "gpx".to_string(),
            path,
            writer: Some(writer),
            point_count: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Points written so far
    pub fn point_count(&self) -> u64 {
        self.point_count
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    fn write_point(&mut self, fix: &GpsFix) -> std::io::Result<bool> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(std::io::Error::other("track already closed"));
        };
        if !fix.latitude.is_finite() || !fix.longitude.is_finite() {
            return Ok(false);
        }

        writeln!(
            writer,
            r#"      <trkpt lat="{:.6}" lon="{:.6}">"#,
            fix.latitude, fix.longitude
        )?;
        writeln!(writer, "        <time>{}</time>", fix.timestamp.to_rfc3339_utc())?;
        if let Some(satellites) = fix.satellites {
            writeln!(writer, "        <sat>{satellites}</sat>")?;
        }
        writeln!(writer, "      </trkpt>")?;
        writer.flush()?;

        self.point_count += 1;
        if self.point_count % 10 == 0 {
            debug!(points = self.point_count, "GPX points written");
        }
        Ok(true)
    }

    fn finish(&mut self) -> std::io::Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writeln!(writer, "    </trkseg>")?;
        writeln!(writer, "  </trk>")?;
        writeln!(writer, "</gpx>")?;
        writer.flush()?;
        info!(path = %self.path.display(), points = self.point_count, "GPX track closed");
        Ok(())
    }

    fn to_contract_error(&self, e: std::io::Error) -> ContractError {
        ContractError::sink_write(&self.name, e.to_string())
    }
}

impl RecordSink for GpxTrackWriter {
    type Record = GpsFix;

    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, fix: &GpsFix) -> Result<(), ContractError> {
        self.write_point(fix)
            .map(|_| ())
            .map_err(|e| self.to_contract_error(e))
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush().map_err(ContractError::from),
            None => Ok(()),
        }
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.finish().map_err(|e| self.to_contract_error(e))
    }
}

impl Drop for GpxTrackWriter {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::TimeBase;

    fn fix(latitude: f64, longitude: f64, satellites: Option<u32>) -> GpsFix {
        GpsFix {
            latitude,
            longitude,
            timestamp: TimeBase::new().now(),
            satellites,
        }
    }

    #[tokio::test]
    async fn test_track_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.gpx");

        let mut writer = GpxTrackWriter::create(&path, "20250101_120000_left").unwrap();
        writer.write(&fix(48.1173, 11.516_666_7, Some(8))).await.unwrap();
        writer.write(&fix(-33.75, -151.2, None)).await.unwrap();
        assert_eq!(writer.point_count(), 2);
        writer.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
        assert!(content.contains(r#"version="1.1" creator="SrVsDataset""#));
        assert!(content.contains("<name>20250101_120000_left</name>"));
        assert!(content.contains(r#"<trkpt lat="48.117300" lon="11.516667">"#));
        assert!(content.contains(r#"<trkpt lat="-33.750000" lon="-151.200000">"#));
        assert_eq!(content.matches("<sat>").count(), 1);
        assert!(content.contains("<time>") && content.contains("Z</time>"));
        assert!(content.trim_end().ends_with("</gpx>"));
    }

    #[tokio::test]
    async fn test_points_visible_before_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.gpx");

        let mut writer = GpxTrackWriter::create(&path, "live").unwrap();
        writer.write(&fix(1.0, 2.0, Some(5))).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<trkpt"));
        assert!(!content.contains("</gpx>"));
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_idempotent_and_rejects_late_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twice.gpx");

        let mut writer = GpxTrackWriter::create(&path, "a & b").unwrap();
        writer.close().await.unwrap();
        writer.close().await.unwrap();
        assert!(writer.write(&fix(1.0, 2.0, None)).await.is_err());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("</gpx>").count(), 1);
        assert!(content.contains("<name>a &amp; b</name>"));
    }

    #[tokio::test]
    async fn test_non_finite_points_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = GpxTrackWriter::create(dir.path().join("nan.gpx"), "nan").unwrap();
        writer.write(&fix(f64::NAN, 2.0, None)).await.unwrap();
        assert_eq!(writer.point_count(), 0);
    }

    #[test]
    fn test_missing_directory_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("track.gpx");
        let err = GpxTrackWriter::create(&path, "x").err().unwrap();
        match err {
            DispatcherError::SinkCreation { sink, path: reported, .. } => {
                assert_eq!(sink, "gpx");
                assert_eq!(reported, path);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
