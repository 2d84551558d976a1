//! Frame - camera output owned by value
//!
//! A frame is moved from the capture callback into the encoding queue and
//! from there into the consumer; nobody else holds a reference to its pixels.

use crate::ContractError;

/// Channel layout of a pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// 8-bit RGB, 3 bytes per pixel
    Rgb8,
    /// 8-bit BGR, 3 bytes per pixel
    Bgr8,
    /// 8-bit mono
    Gray8,
}

impl PixelLayout {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgb8 | Self::Bgr8 => 3,
            Self::Gray8 => 1,
        }
    }

    pub fn is_color(&self) -> bool {
        !matches!(self, Self::Gray8)
    }
}

/// Raw camera frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    layout: PixelLayout,
    pixels: Vec<u8>,
}

impl Frame {
    /// Build a frame, checking the buffer length against the dimensions
    pub fn new(
        width: u32,
        height: u32,
        layout: PixelLayout,
        pixels: Vec<u8>,
    ) -> Result<Self, ContractError> {
        let expected = width as usize * height as usize * layout.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(ContractError::Other(format!(
                "frame buffer is {} bytes, expected {expected} for {width}x{height} {layout:?}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            layout,
            pixels,
        })
    }

    /// Frame as delivered by the camera callback: RGB when color, mono otherwise
    pub fn from_capture(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        is_color: bool,
    ) -> Result<Self, ContractError> {
        let layout = if is_color {
            PixelLayout::Rgb8
        } else {
            PixelLayout::Gray8
        };
        Self::new(width, height, layout, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn is_color(&self) -> bool {
        self.layout.is_color()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Release the buffer
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Reorder color channels in place. Mono frames are left as-is.
    pub fn convert_to(&mut self, target: PixelLayout) {
        match (self.layout, target) {
            (PixelLayout::Rgb8, PixelLayout::Bgr8) | (PixelLayout::Bgr8, PixelLayout::Rgb8) => {
                for px in self.pixels.chunks_exact_mut(3) {
                    px.swap(0, 2);
                }
                self.layout = target;
            }
            _ => {}
        }
    }
}
