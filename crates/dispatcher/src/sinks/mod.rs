//! Sink implementations
//!
//! GPX track log and sensor log (JSON array + CSV mirror).

mod gpx;
mod sensor_log;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::{DispatcherError, Result};

pub use self::gpx::GpxTrackWriter;
pub use self::sensor_log::{csv_row, SensorLogWriter, DEFAULT_FLUSH_EVERY, SENSOR_CSV_HEADER};

/// Create `path`, write the header and flush it
///
/// A failure anywhere in between is reported as a creation error for `sink`.
fn create_with_header(
    sink: &'static str,
    path: &Path,
    header: impl FnOnce(&mut BufWriter<File>) -> io::Result<()>,
) -> Result<BufWriter<File>> {
    let open = || -> io::Result<BufWriter<File>> {
        let mut writer = BufWriter::new(File::create(path)?);
        header(&mut writer)?;
        writer.flush()?;
        Ok(writer)
    };
    open().map_err(|e| DispatcherError::sink_creation(sink, path, e))
}
