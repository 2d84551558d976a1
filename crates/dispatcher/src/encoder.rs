//! ImageSequenceEncoder - numbered still images behind the `VideoEncoder` boundary
//!
//! `<stem>.mp4` becomes a directory `<stem>_frames/` holding
//! `frame_000001.jpg`, `frame_000002.jpg`, ...

use std::fs;
use std::path::{Path, PathBuf};

use contracts::{ContractError, Frame, FrameImageFormat, PixelLayout, VideoEncoder, VideoFileInfo};
use image::{ColorType, ImageFormat};
use tracing::{debug, info};

struct SequenceOutput {
    dir: PathBuf,
    width: u32,
    height: u32,
    frames: u64,
    bytes: u64,
}

/// Writes each frame as a JPEG or PNG file
pub struct ImageSequenceEncoder {
    format: FrameImageFormat,
    output: Option<SequenceOutput>,
}

impl ImageSequenceEncoder {
    pub fn new(format: FrameImageFormat) -> Self {
        Self {
            format,
            output: None,
        }
    }

    /// Directory used for a requested video path
    pub fn frames_dir_for(path: &Path) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        path.with_file_name(format!("{stem}_frames"))
    }

    fn image_format(&self) -> ImageFormat {
        match self.format {
            FrameImageFormat::Jpeg => ImageFormat::Jpeg,
            FrameImageFormat::Png => ImageFormat::Png,
        }
    }
}

impl Default for ImageSequenceEncoder {
    fn default() -> Self {
        Self::new(FrameImageFormat::default())
    }
}

impl VideoEncoder for ImageSequenceEncoder {
    fn input_layout(&self) -> PixelLayout {
        PixelLayout::Rgb8
    }

    fn start_encoding(
        &mut self,
        path: &Path,
        width: u32,
        height: u32,
        _fps: f64,
    ) -> Result<(), ContractError> {
        if self.output.is_some() {
            return Err(ContractError::encoder("encoder already started"));
        }
        if width == 0 || height == 0 {
            return Err(ContractError::encoder(format!(
                "invalid frame size {width}x{height}"
            )));
        }

        let dir = Self::frames_dir_for(path);
        fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), width, height, format = self.format.extension(), "Image sequence opened");

        self.output = Some(SequenceOutput {
            dir,
            width,
            height,
            frames: 0,
            bytes: 0,
        });
        Ok(())
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<(), ContractError> {
        let image_format = self.image_format();
        let extension = self.format.extension();
        let Some(output) = self.output.as_mut() else {
            return Err(ContractError::encoder("encoder not started"));
        };
        if frame.width() != output.width || frame.height() != output.height {
            return Err(ContractError::encoder(format!(
                "frame is {}x{}, stream is {}x{}",
                frame.width(),
                frame.height(),
                output.width,
                output.height
            )));
        }

        let converted;
        let frame = if frame.layout() == PixelLayout::Bgr8 {
            let mut rgb = frame.clone();
            rgb.convert_to(PixelLayout::Rgb8);
            converted = rgb;
            &converted
        } else {
            frame
        };
        let color = match frame.layout() {
            PixelLayout::Gray8 => ColorType::L8,
            _ => ColorType::Rgb8,
        };

        let index = output.frames + 1;
        let file = output.dir.join(format!("frame_{index:06}.{extension}"));
        image::save_buffer_with_format(
            &file,
            frame.pixels(),
            frame.width(),
            frame.height(),
            color,
            image_format,
        )
        .map_err(|e| ContractError::encoder(e.to_string()))?;

        output.bytes += fs::metadata(&file)?.len();
        output.frames = index;
        debug!(frame = index, "Frame image written");
        Ok(())
    }

    fn stop_encoding(&mut self) -> Result<VideoFileInfo, ContractError> {
        let output = self
            .output
            .take()
            .ok_or_else(|| ContractError::encoder("encoder not started"))?;
        info!(
            dir = %output.dir.display(),
            frames = output.frames,
            bytes = output.bytes,
            "Image sequence closed"
        );
        Ok(VideoFileInfo {
            path: output.dir,
            size_bytes: output.bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_dir_name() {
        let dir = ImageSequenceEncoder::frames_dir_for(Path::new("/data/20250101_120000_left.mp4"));
        assert_eq!(dir, PathBuf::from("/data/20250101_120000_left_frames"));
    }

    #[test]
    fn test_png_sequence_roundtrip_pixels() {
        let tmp = tempfile::tempdir().unwrap();
        let mut encoder = ImageSequenceEncoder::new(FrameImageFormat::Png);
        encoder
            .start_encoding(&tmp.path().join("clip.mp4"), 2, 1, 30.0)
            .unwrap();

        let bgr = Frame::new(2, 1, PixelLayout::Bgr8, vec![30, 20, 10, 60, 50, 40]).unwrap();
        encoder.write_frame(&bgr).unwrap();
        let gray = Frame::from_capture(vec![7, 9], 2, 1, false).unwrap();
        encoder.write_frame(&gray).unwrap();

        let info = encoder.stop_encoding().unwrap();
        assert_eq!(info.path, tmp.path().join("clip_frames"));
        assert!(info.size_bytes > 0);

        let first = image::open(info.path.join("frame_000001.png")).unwrap().to_rgb8();
        assert_eq!(first.get_pixel(0, 0).0, [10, 20, 30]);
        assert_eq!(first.get_pixel(1, 0).0, [40, 50, 60]);
        assert!(info.path.join("frame_000002.png").exists());
    }

    #[test]
    fn test_rejects_size_mismatch_and_unstarted() {
        let tmp = tempfile::tempdir().unwrap();
        let mut encoder = ImageSequenceEncoder::default();
        let frame = Frame::from_capture(vec![0; 12], 2, 2, true).unwrap();
        assert!(encoder.write_frame(&frame).is_err());
        assert!(encoder.stop_encoding().is_err());

        encoder
            .start_encoding(&tmp.path().join("v.mp4"), 4, 4, 30.0)
            .unwrap();
        assert!(encoder.write_frame(&frame).is_err());
        assert!(encoder.start_encoding(&tmp.path().join("w.mp4"), 4, 4, 30.0).is_err());
    }
}
