//! The persisted bin-video container and the image/video persistence paths.
//!
//! Layout (little-endian, no padding):
//!
//! ```text
//! frameCount: u32, width: i32, height: i32, quality: i32
//! repeated frameCount times:
//!   length: u32
//!   payload: length bytes (JPEG frame)
//! ```
//!
//! The declared frame count always equals the number of entries present and
//! each declared length equals its payload's byte count. Readers stop after
//! exactly `frame_count` entries; trailing bytes are ignorable.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::codec::{JpegCoder, SoftJpegCoder};
use crate::errors::RecorderError;
use crate::types::{FramePayload, FrameRecord, RawFrame};

/// File extension of the bin-video container.
pub const VIDEO_EXTENSION: &str = "gcvid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoHeader {
    pub frame_count: u32,
    pub width: i32,
    pub height: i32,
    pub quality: i32,
}

impl VideoHeader {
    pub const SIZE: usize = 16;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.frame_count.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.width.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.height.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.quality.to_le_bytes());
        bytes
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), RecorderError> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, RecorderError> {
        let mut bytes = [0u8; Self::SIZE];
        reader.read_exact(&mut bytes).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                RecorderError::TruncatedFile("file shorter than the header".to_string())
            } else {
                RecorderError::Io(e.to_string())
            }
        })?;
        Ok(Self {
            frame_count: u32::from_le_bytes(bytes[0..4].try_into().expect("slice of 4")),
            width: i32::from_le_bytes(bytes[4..8].try_into().expect("slice of 4")),
            height: i32::from_le_bytes(bytes[8..12].try_into().expect("slice of 4")),
            quality: i32::from_le_bytes(bytes[12..16].try_into().expect("slice of 4")),
        })
    }
}

/// Writes a complete container: header plus every payload, length-prefixed,
/// in iteration order.
pub fn write_video<W: Write>(
    writer: &mut W,
    header: &VideoHeader,
    payloads: &[&[u8]],
) -> Result<(), RecorderError> {
    debug_assert_eq!(header.frame_count as usize, payloads.len());
    header.write_to(writer)?;
    for payload in payloads {
        writer.write_all(&(payload.len() as u32).to_le_bytes())?;
        writer.write_all(payload)?;
    }
    Ok(())
}

/// Sequential reader over a container's frame entries.
pub struct VideoReader<R: Read> {
    header: VideoHeader,
    inner: R,
    read: u32,
}

impl<R: Read> VideoReader<R> {
    pub fn new(mut inner: R) -> Result<Self, RecorderError> {
        let header = VideoHeader::read_from(&mut inner)?;
        Ok(Self {
            header,
            inner,
            read: 0,
        })
    }

    pub fn header(&self) -> VideoHeader {
        self.header
    }

    /// Next length-prefixed payload; `None` once `frame_count` entries were
    /// read (any trailing bytes stay untouched). Premature end of file is a
    /// truncated-file error, never a silent short read.
    pub fn next_entry(&mut self) -> Result<Option<Vec<u8>>, RecorderError> {
        if self.read >= self.header.frame_count {
            return Ok(None);
        }
        let truncated = |_: std::io::Error| {
            RecorderError::TruncatedFile(format!(
                "header declares {} frames but entry {} is incomplete",
                self.header.frame_count, self.read
            ))
        };

        let mut len_bytes = [0u8; 4];
        self.inner.read_exact(&mut len_bytes).map_err(truncated)?;
        let length = u32::from_le_bytes(len_bytes);
        let mut payload = vec![0u8; length as usize];
        self.inner.read_exact(&mut payload).map_err(truncated)?;
        self.read += 1;
        Ok(Some(payload))
    }
}

fn ensure_dir(dir: &Path) -> Result<(), RecorderError> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Persists one device's frames as individual JPEG files named from the
/// device serial and sequence number. Already-encoded payloads are written
/// verbatim; raw payloads are converted at save time.
pub fn save_images(
    dir: &Path,
    serial: &str,
    dimensions: (u32, u32),
    frames: &[FrameRecord],
    quality: i32,
    reserve_ratio: f32,
) -> Result<usize, RecorderError> {
    ensure_dir(dir)?;
    let (width, height) = dimensions;
    let mut coder = SoftJpegCoder::new();
    let mut coder_ready = false;

    for record in frames {
        let path = dir.join(format!("{}_{:05}.jpg", serial, record.sequence));
        match &record.payload {
            FramePayload::Jpeg(bytes) => std::fs::write(&path, bytes)?,
            FramePayload::Raw(bytes) => {
                if !coder_ready {
                    coder.init(width, height, quality, reserve_ratio)?;
                    coder_ready = true;
                }
                let jpeg = coder.encode(&RawFrame::new(bytes.clone(), width, height))?;
                std::fs::write(&path, jpeg)?;
            }
        }
    }
    coder.release();
    info!("{}: saved {} images to {:?}", serial, frames.len(), dir);
    Ok(frames.len())
}

/// Persists one device's frames as a bin-video container. The GPU encode
/// path only: every payload must already be JPEG.
pub fn save_video(
    dir: &Path,
    serial: &str,
    dimensions: (u32, u32),
    frames: &[FrameRecord],
    quality: i32,
) -> Result<PathBuf, RecorderError> {
    let payloads: Vec<&[u8]> = frames
        .iter()
        .map(|record| match &record.payload {
            FramePayload::Jpeg(bytes) => Ok(bytes.as_slice()),
            FramePayload::Raw(_) => Err(RecorderError::UnsupportedBufferType(format!(
                "{}: video save requires JPEG-buffered capture",
                serial
            ))),
        })
        .collect::<Result<_, _>>()?;

    ensure_dir(dir)?;
    let (width, height) = dimensions;
    let header = VideoHeader {
        frame_count: frames.len() as u32,
        width: width as i32,
        height: height as i32,
        quality,
    };

    let path = dir.join(format!("{}.{}", serial, VIDEO_EXTENSION));
    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);
    write_video(&mut writer, &header, &payloads)?;
    writer.flush()?;
    info!("{}: saved {} frames to {:?}", serial, frames.len(), path);
    Ok(path)
}
