//! JPEG codec adapter.
//!
//! The production pipeline runs frames through a GPU-resident JPEG coder
//! owned by the device that allocated it. That primitive is an external
//! collaborator; this module pins down its contract (`init` / `encode` /
//! `decode` / `release`) and ships a software implementation so the pipeline
//! runs without GPU hardware.

use crate::errors::RecorderError;
use crate::types::RawFrame;

/// Contract of the JPEG codec primitive. One coder instance per device;
/// `release` must be safe to call more than once.
pub trait JpegCoder: Send {
    fn init(
        &mut self,
        width: u32,
        height: u32,
        quality: i32,
        reserve_ratio: f32,
    ) -> Result<(), RecorderError>;

    /// Encodes one tightly-packed RGB8 frame.
    fn encode(&mut self, frame: &RawFrame) -> Result<Vec<u8>, RecorderError>;

    /// Decodes one JPEG payload back into an RGB8 frame.
    fn decode(&mut self, jpeg: &[u8]) -> Result<RawFrame, RecorderError>;

    fn release(&mut self);
}

/// CPU implementation of the coder contract backed by the `image` crate.
///
/// `reserve_ratio` is a GPU-memory hint with no software equivalent; it is
/// accepted and ignored.
pub struct SoftJpegCoder {
    width: u32,
    height: u32,
    quality: u8,
    initialized: bool,
}

impl SoftJpegCoder {
    pub fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            quality: 90,
            initialized: false,
        }
    }
}

impl Default for SoftJpegCoder {
    fn default() -> Self {
        Self::new()
    }
}

impl JpegCoder for SoftJpegCoder {
    fn init(
        &mut self,
        width: u32,
        height: u32,
        quality: i32,
        _reserve_ratio: f32,
    ) -> Result<(), RecorderError> {
        if width == 0 || height == 0 {
            return Err(RecorderError::Encoding(format!(
                "invalid coder dimensions {}x{}",
                width, height
            )));
        }
        if !(1..=100).contains(&quality) {
            return Err(RecorderError::Encoding(format!(
                "JPEG quality {} out of range 1-100",
                quality
            )));
        }
        self.width = width;
        self.height = height;
        self.quality = quality as u8;
        self.initialized = true;
        Ok(())
    }

    fn encode(&mut self, frame: &RawFrame) -> Result<Vec<u8>, RecorderError> {
        if !self.initialized {
            return Err(RecorderError::Encoding("coder not initialized".to_string()));
        }
        let expected = (self.width * self.height * 3) as usize;
        if frame.data.len() != expected {
            return Err(RecorderError::Encoding(format!(
                "invalid frame size: expected {} bytes, got {}",
                expected,
                frame.data.len()
            )));
        }

        let mut out = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, self.quality);
        encoder
            .encode(
                &frame.data,
                self.width,
                self.height,
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| RecorderError::Encoding(format!("JPEG encode failed: {}", e)))?;
        Ok(out)
    }

    fn decode(&mut self, jpeg: &[u8]) -> Result<RawFrame, RecorderError> {
        if !self.initialized {
            return Err(RecorderError::Decoding("coder not initialized".to_string()));
        }
        let img = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)
            .map_err(|e| RecorderError::Decoding(format!("JPEG decode failed: {}", e)))?;
        let rgb = img.to_rgb8();
        let (width, height) = (rgb.width(), rgb.height());
        Ok(RawFrame::new(rgb.into_raw(), width, height))
    }

    fn release(&mut self) {
        self.initialized = false;
    }
}
