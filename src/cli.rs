//! Recorder command-line parsing.
//!
//! Tokens are case-insensitive and processed left to right; every device
//! token appends another camera. Unrecognized tokens are warned about and
//! skipped. A token missing its required argument is a usage error; the
//! recorder binary exits -1 on those.

use log::warn;

use crate::errors::RecorderError;
use crate::types::CameraModel;

pub const USAGE: &str = "\
Usage: gencam-record [CameraType]([XIMEA],[PTGREY],[STEREO],[FILE <dir>]) [frame <count>]
       [bright <level>] [wait <port>] [video] [hard] [folder <name>] [exposure <ms>]
       [expsn <sn> <ms>]
Sample1:
  use ximea & file (replay dir ./mp4s/) cameras, save 200 frames, wait for the sync
  trigger on port 12344, save video format, hardware sync:
    gencam-record XIMEA FILE ./mp4s/ frame 200 wait 12344 video hard
Sample2:
  ptgrey cameras only, default 500 frames, image format, brightness level 25:
    gencam-record PTGREY bright 25";

#[derive(Debug, Clone, PartialEq)]
pub struct RecordOptions {
    pub cameras: Vec<CameraModel>,
    /// Save as bin-video instead of image files.
    pub video: bool,
    pub hard_sync: bool,
    /// Manual exposure in milliseconds; `None` selects auto exposure.
    pub exposure_ms: Option<f64>,
    pub brightness: i32,
    pub frame_count: usize,
    /// Trigger-gated start: port the channel binds on.
    pub wait_port: Option<u16>,
    /// Output directory; defaults to a timestamp when absent.
    pub folder: Option<String>,
    /// Per-device exposure overrides as (serial substring, milliseconds).
    pub serial_exposures: Vec<(String, f64)>,
    pub help: bool,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            cameras: Vec::new(),
            video: false,
            hard_sync: false,
            exposure_ms: None,
            brightness: 40,
            frame_count: 500,
            wait_port: None,
            folder: None,
            serial_exposures: Vec::new(),
            help: false,
        }
    }
}

fn missing(token: &str, hint: &str) -> RecorderError {
    RecorderError::Usage(format!("{} needs an argument: {}", token, hint))
}

fn parse_value<T: std::str::FromStr>(
    args: &[String],
    index: usize,
    token: &str,
    hint: &str,
) -> Result<T, RecorderError> {
    let raw = args.get(index).ok_or_else(|| missing(token, hint))?;
    raw.parse::<T>()
        .map_err(|_| RecorderError::Usage(format!("{}: cannot parse \"{}\" ({})", token, raw, hint)))
}

pub fn parse_args(args: &[String]) -> Result<RecordOptions, RecorderError> {
    let mut opts = RecordOptions::default();

    let mut i = 0;
    while i < args.len() {
        let token = args[i].to_lowercase();
        match token.as_str() {
            "help" => {
                opts.help = true;
                return Ok(opts);
            }
            "ximea" | "x" => opts.cameras.push(CameraModel::Ximea),
            "ptgrey" | "pointgrey" | "p" => opts.cameras.push(CameraModel::PtGrey),
            "stereo" | "s" => opts.cameras.push(CameraModel::Stereo),
            "file" | "f" => {
                let dir = args
                    .get(i + 1)
                    .ok_or_else(|| missing("file", "gencam-record FILE ./mp4s/"))?;
                opts.cameras.push(CameraModel::FileReplay(dir.clone()));
                i += 1;
            }
            "video" | "v" => opts.video = true,
            "exposure" => {
                opts.exposure_ms = Some(parse_value(
                    args,
                    i + 1,
                    "exposure",
                    "gencam-record XIMEA exposure 50",
                )?);
                i += 1;
            }
            "bright" => {
                opts.brightness =
                    parse_value(args, i + 1, "bright", "gencam-record XIMEA bright 50")?;
                i += 1;
            }
            "frame" => {
                opts.frame_count =
                    parse_value(args, i + 1, "frame", "gencam-record XIMEA frame 200")?;
                i += 1;
            }
            "wait" => {
                opts.wait_port = Some(parse_value(
                    args,
                    i + 1,
                    "wait",
                    "gencam-record XIMEA wait 22336",
                )?);
                i += 1;
            }
            "hard" => opts.hard_sync = true,
            "folder" => {
                let name = args
                    .get(i + 1)
                    .ok_or_else(|| missing("folder", "gencam-record XIMEA folder hello"))?;
                opts.folder = Some(name.clone());
                i += 1;
            }
            "expsn" => {
                let sn = args
                    .get(i + 1)
                    .cloned()
                    .ok_or_else(|| missing("expsn", "gencam-record XIMEA expsn CACU123 10.0"))?;
                let ms: f64 = parse_value(
                    args,
                    i + 2,
                    "expsn",
                    "gencam-record XIMEA expsn CACU123 10.0",
                )?;
                opts.serial_exposures.push((sn, ms));
                i += 2;
            }
            other => warn!("can't recognize argument \"{}\"", other),
        }
        i += 1;
    }

    // No device token implies one default camera.
    if opts.cameras.is_empty() {
        opts.cameras.push(CameraModel::Ximea);
    }
    Ok(opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn defaults_when_no_tokens() {
        let opts = parse_args(&[]).unwrap();
        assert_eq!(opts.cameras, vec![CameraModel::Ximea]);
        assert_eq!(opts.frame_count, 500);
        assert_eq!(opts.brightness, 40);
        assert!(!opts.video);
        assert!(opts.wait_port.is_none());
    }

    #[test]
    fn device_tokens_append_in_order() {
        let opts = parse_args(&args(&["XIMEA", "file", "./mp4s/", "p"])).unwrap();
        assert_eq!(
            opts.cameras,
            vec![
                CameraModel::Ximea,
                CameraModel::FileReplay("./mp4s/".to_string()),
                CameraModel::PtGrey,
            ]
        );
    }

    #[test]
    fn tokens_are_case_insensitive() {
        let opts = parse_args(&args(&["StErEo", "VIDEO", "Hard"])).unwrap();
        assert_eq!(opts.cameras, vec![CameraModel::Stereo]);
        assert!(opts.video);
        assert!(opts.hard_sync);
    }

    #[test]
    fn full_sample_line_parses() {
        let opts = parse_args(&args(&[
            "x", "frame", "200", "wait", "12344", "bright", "25", "folder", "run1", "expsn",
            "CACU123", "10.0", "exposure", "50",
        ]))
        .unwrap();
        assert_eq!(opts.frame_count, 200);
        assert_eq!(opts.wait_port, Some(12344));
        assert_eq!(opts.brightness, 25);
        assert_eq!(opts.folder.as_deref(), Some("run1"));
        assert_eq!(opts.serial_exposures, vec![("CACU123".to_string(), 10.0)]);
        assert_eq!(opts.exposure_ms, Some(50.0));
    }

    #[test]
    fn missing_arguments_are_usage_errors() {
        for tokens in [
            vec!["file"],
            vec!["exposure"],
            vec!["bright"],
            vec!["frame"],
            vec!["wait"],
            vec!["folder"],
            vec!["expsn"],
            vec!["expsn", "CACU123"],
        ] {
            let result = parse_args(&args(&tokens));
            assert!(
                matches!(result, Err(RecorderError::Usage(_))),
                "{:?} should be a usage error",
                tokens
            );
        }
    }

    #[test]
    fn unparsable_numbers_are_usage_errors() {
        assert!(matches!(
            parse_args(&args(&["frame", "many"])),
            Err(RecorderError::Usage(_))
        ));
        assert!(matches!(
            parse_args(&args(&["wait", "not-a-port"])),
            Err(RecorderError::Usage(_))
        ));
    }

    #[test]
    fn unknown_tokens_are_skipped() {
        let opts = parse_args(&args(&["bogus", "stereo", "nonsense"])).unwrap();
        assert_eq!(opts.cameras, vec![CameraModel::Stereo]);
    }

    #[test]
    fn help_short_circuits() {
        let opts = parse_args(&args(&["help", "frame"])).unwrap();
        assert!(opts.help);
    }
}
