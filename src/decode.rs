//! Decoder-tool logic: locate a device's bin-video container, validate it in
//! full, and re-encode it into a playable MP4.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::info;

use crate::codec::{JpegCoder, SoftJpegCoder};
use crate::errors::RecorderError;
use crate::video::{VideoHeader, VideoReader};

/// Frame rate of the decoded output video.
pub const OUTPUT_FPS: f64 = 10.0;

/// Finds the container in `dir` whose file name contains `serial`.
///
/// The match must be unique: zero candidates and ambiguous candidates both
/// fail, rather than silently picking whichever name sorts first.
pub fn find_video_file(dir: &Path, serial: &str) -> Result<PathBuf, RecorderError> {
    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| name.contains(serial))
        })
        .collect();
    matches.sort();

    match matches.len() {
        0 => Err(RecorderError::NotFound(format!(
            "no file matching \"{}\" in {:?}",
            serial, dir
        ))),
        1 => Ok(matches.remove(0)),
        n => Err(RecorderError::NotFound(format!(
            "\"{}\" is ambiguous: {} files match in {:?} ({:?})",
            serial, n, dir, matches
        ))),
    }
}

/// Reads and fully validates a container: header plus exactly `frame_count`
/// length-prefixed JPEG payloads. A short file fails here, before any output
/// exists.
pub fn read_container(path: &Path) -> Result<(VideoHeader, Vec<Vec<u8>>), RecorderError> {
    let file = File::open(path)
        .map_err(|e| RecorderError::Io(format!("failed to open {:?}: {}", path, e)))?;
    let mut reader = VideoReader::new(BufReader::new(file))?;
    let header = reader.header();

    let mut payloads = Vec::with_capacity(header.frame_count as usize);
    while let Some(payload) = reader.next_entry()? {
        payloads.push(payload);
    }
    Ok((header, payloads))
}

/// Decodes the container found for `serial` under `input_dir` into an MP4 at
/// `output`. Strictly sequential; the codec context is the only state shared
/// across frames. No output file is produced on failure.
pub fn decode_to_video(
    input_dir: &Path,
    serial: &str,
    output: &Path,
) -> Result<u64, RecorderError> {
    let container = find_video_file(input_dir, serial)?;
    info!("found bin file: {:?}", container);

    // Validate everything up front so a truncated container never leaves a
    // partial output file behind.
    let (header, payloads) = read_container(&container)?;
    info!(
        "decoding {} frames ({}x{}, quality {})",
        header.frame_count, header.width, header.height, header.quality
    );

    let mut coder = SoftJpegCoder::new();
    coder.init(
        header.width as u32,
        header.height as u32,
        header.quality,
        0.0,
    )?;

    let result = write_output(output, &header, &payloads, &mut coder);
    coder.release();
    if result.is_err() {
        let _ = std::fs::remove_file(output);
    }
    result
}

fn write_output(
    output: &Path,
    header: &VideoHeader,
    payloads: &[Vec<u8>],
    coder: &mut SoftJpegCoder,
) -> Result<u64, RecorderError> {
    let mut writer = crate::mp4::Mp4Writer::create(
        output,
        header.width as u32,
        header.height as u32,
        OUTPUT_FPS,
    )?;
    for (index, payload) in payloads.iter().enumerate() {
        info!("decode frame {}, total {} frames", index, payloads.len());
        let frame = coder.decode(payload)?;
        writer.write_frame(&frame)?;
    }
    writer.finish()
}
