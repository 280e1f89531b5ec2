//! Playable-video output for the decoder tool: H.264 encoding (openh264)
//! muxed into MP4 (muxide).
//!
//! The decoder replays a fixed frame list from a container, so there is no
//! wall-clock pacing here; presentation timestamps derive purely from the
//! frame index and the output frame rate.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use muxide::api::{Metadata, MuxerBuilder, VideoCodec};
use openh264::encoder::{Encoder, FrameType};
use openh264::formats::YUVBuffer;

use crate::errors::RecorderError;
use crate::types::RawFrame;

/// H.264 encoder over openh264. Dimensions are fixed at construction; every
/// frame must match.
pub struct H264Encoder {
    encoder: Encoder,
    width: u32,
    height: u32,
}

impl H264Encoder {
    pub fn new(width: u32, height: u32) -> Result<Self, RecorderError> {
        let encoder = Encoder::new()
            .map_err(|e| RecorderError::Encoding(format!("failed to create encoder: {}", e)))?;
        Ok(Self {
            encoder,
            width,
            height,
        })
    }

    /// Encodes one RGB frame to Annex B H.264, reporting whether it is a
    /// keyframe.
    pub fn encode_rgb(&mut self, frame: &RawFrame) -> Result<(Vec<u8>, bool), RecorderError> {
        let expected = (self.width * self.height * 3) as usize;
        if frame.data.len() != expected {
            return Err(RecorderError::Encoding(format!(
                "invalid frame size: expected {} bytes, got {}",
                expected,
                frame.data.len()
            )));
        }

        let yuv = rgb_to_yuv420(&frame.data, self.width, self.height);
        let buffer = YUVBuffer::from_vec(yuv, self.width as usize, self.height as usize);
        let bitstream = self
            .encoder
            .encode(&buffer)
            .map_err(|e| RecorderError::Encoding(format!("encoding failed: {}", e)))?;

        let is_keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        Ok((bitstream.to_vec(), is_keyframe))
    }
}

/// MP4 writer at a fixed frame rate.
pub struct Mp4Writer {
    encoder: H264Encoder,
    muxer: muxide::api::Muxer<BufWriter<File>>,
    fps: f64,
    frame_count: u64,
}

impl Mp4Writer {
    pub fn create<P: AsRef<Path>>(
        path: P,
        width: u32,
        height: u32,
        fps: f64,
    ) -> Result<Self, RecorderError> {
        let file = File::create(&path)
            .map_err(|e| RecorderError::Io(format!("failed to create output file: {}", e)))?;
        let writer = BufWriter::new(file);

        let encoder = H264Encoder::new(width, height)?;
        let muxer = MuxerBuilder::new(writer)
            .video(VideoCodec::H264, width, height, fps)
            .with_fast_start(true)
            .with_metadata(Metadata::new().with_current_time())
            .build()
            .map_err(|e| RecorderError::Muxing(format!("failed to create muxer: {}", e)))?;

        Ok(Self {
            encoder,
            muxer,
            fps,
            frame_count: 0,
        })
    }

    pub fn write_frame(&mut self, frame: &RawFrame) -> Result<(), RecorderError> {
        let (encoded, is_keyframe) = self.encoder.encode_rgb(frame)?;
        if encoded.is_empty() {
            // The encoder may buffer without emitting; nothing to mux yet.
            return Ok(());
        }
        let pts = self.frame_count as f64 / self.fps;
        self.muxer
            .write_video(pts, &encoded, is_keyframe)
            .map_err(|e| RecorderError::Muxing(format!("failed to write frame: {}", e)))?;
        self.frame_count += 1;
        Ok(())
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Finalizes the MP4; the file is unusable until this runs.
    pub fn finish(self) -> Result<u64, RecorderError> {
        let stats = self
            .muxer
            .finish_with_stats()
            .map_err(|e| RecorderError::Muxing(format!("failed to finalize output: {}", e)))?;
        Ok(stats.video_frames)
    }
}

/// RGB24 to planar YUV420, BT.601.
fn rgb_to_yuv420(rgb: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;

    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut yuv = vec![0u8; y_size + uv_size * 2];

    let (y_plane, uv_planes) = yuv.split_at_mut(y_size);
    let (u_plane, v_plane) = uv_planes.split_at_mut(uv_size);

    for y in 0..h {
        for x in 0..w {
            let rgb_idx = (y * w + x) * 3;
            let r = rgb[rgb_idx] as i32;
            let g = rgb[rgb_idx + 1] as i32;
            let b = rgb[rgb_idx + 2] as i32;

            let y_val = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            y_plane[y * w + x] = y_val.clamp(0, 255) as u8;

            if y % 2 == 0 && x % 2 == 0 {
                let uv_idx = (y / 2) * (w / 2) + (x / 2);
                let u_val = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
                let v_val = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
                u_plane[uv_idx] = u_val.clamp(0, 255) as u8;
                v_plane[uv_idx] = v_val.clamp(0, 255) as u8;
            }
        }
    }

    yuv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::synthetic_frame;

    #[test]
    fn yuv420_has_expected_size() {
        let rgb = vec![128u8; 640 * 480 * 3];
        let yuv = rgb_to_yuv420(&rgb, 640, 480);
        assert_eq!(yuv.len(), 640 * 480 * 3 / 2);
    }

    #[test]
    fn encoder_rejects_wrong_frame_size() {
        let mut encoder = H264Encoder::new(320, 240).expect("encoder");
        let frame = RawFrame::new(vec![0u8; 10], 320, 240);
        assert!(encoder.encode_rgb(&frame).is_err());
    }

    #[test]
    fn first_encoded_frame_is_keyframe() {
        let mut encoder = H264Encoder::new(320, 240).expect("encoder");
        let frame = synthetic_frame(0, 320, 240);
        let (data, is_keyframe) = encoder.encode_rgb(&frame).expect("encode");
        assert!(!data.is_empty());
        assert!(is_keyframe);
        assert!(
            data.starts_with(&[0, 0, 0, 1]) || data.starts_with(&[0, 0, 1]),
            "Annex B start code expected"
        );
    }

    #[test]
    fn mp4_writer_produces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let mut writer = Mp4Writer::create(&path, 320, 240, 10.0).expect("writer");
        for i in 0..10 {
            writer.write_frame(&synthetic_frame(i, 320, 240)).expect("write");
        }
        let frames = writer.finish().expect("finish");
        assert!(frames > 0);
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
