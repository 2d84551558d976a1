//! Dataset storage layout
//!
//! `root/<road>/<weather>/<time>/<side>/YYYYMMDD_HHMMSS_<side>{.json,.gpx,_sensors.json,_sensors.csv}`
//! plus whatever the video encoder derives from `<base>.mp4`.

use std::path::{Path, PathBuf};

use contracts::{EnvironmentTags, Timestamp};
use serde::Serialize;

/// File paths of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionPaths {
    pub dir: PathBuf,
    pub base_name: String,
    /// Path handed to the video encoder, not necessarily a file on disk.
    /// The encoder reports its real output in `EncodedFileInfo::path`;
    /// the image-sequence encoder writes `<base>_frames/` instead.
    pub video_target: PathBuf,
    pub metadata: PathBuf,
    pub track: PathBuf,
    pub sensor_json: PathBuf,
    pub sensor_csv: PathBuf,
}

impl SessionPaths {
    pub fn new(root: &Path, tags: &EnvironmentTags, start: &Timestamp) -> Self {
        let dir = tags.folder_path(root);
        let base_name = format!("{}_{}", start.file_stamp(), tags.recording_side);
        Self {
            video_target: dir.join(format!("{base_name}.mp4")),
            metadata: dir.join(format!("{base_name}.json")),
            track: dir.join(format!("{base_name}.gpx")),
            sensor_json: dir.join(format!("{base_name}_sensors.json")),
            sensor_csv: dir.join(format!("{base_name}_sensors.csv")),
            dir,
            base_name,
        }
    }
}

/// Bare file name, as recorded in the metadata document
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
