//! File-replay backend: replays a directory of image frames as if it were a
//! live camera.
//!
//! Each immediate subdirectory of the replay root becomes one virtual
//! device; a root with no subdirectories is itself a single device. Frames
//! are the image files inside, replayed in lexical order and looped, paced
//! at the committed FPS.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};

use super::{record_setting, CameraBackend, FrameSource};
use crate::config::DeviceSetting;
use crate::errors::RecorderError;
use crate::types::{CameraModel, DeviceInfo, RawFrame, SyncType};

const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff"];

pub struct ReplayBackend {
    root: PathBuf,
    devices: Vec<ReplayDevice>,
    streaming: bool,
    sources_taken: bool,
}

struct ReplayDevice {
    info: DeviceInfo,
    frames: Vec<PathBuf>,
}

impl ReplayBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            root: dir.into(),
            devices: Vec::new(),
            streaming: false,
            sources_taken: false,
        }
    }
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, RecorderError> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if let Some(ext) = ext {
            if FRAME_EXTENSIONS.contains(&ext.as_str()) {
                frames.push(path);
            }
        }
    }
    frames.sort();
    Ok(frames)
}

fn device_from_dir(dir: &Path) -> Result<Option<ReplayDevice>, RecorderError> {
    let frames = list_frames(dir)?;
    if frames.is_empty() {
        return Ok(None);
    }
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "replay".to_string());
    // Probe the first frame for geometry so the snapshot is usable before
    // any capture runs.
    let (width, height) = image::image_dimensions(&frames[0])
        .map_err(|e| RecorderError::DeviceInit(format!("unreadable frame {:?}: {}", frames[0], e)))?;
    let mut info = DeviceInfo::new(format!("FILE-{}", name), width, height);
    info.fps = 10.0;
    Ok(Some(ReplayDevice { info, frames }))
}

pub struct ReplaySource {
    serial: String,
    frames: Vec<PathBuf>,
    cursor: usize,
    fps: f32,
}

impl FrameSource for ReplaySource {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn next_frame(&mut self) -> Result<RawFrame, RecorderError> {
        if self.fps > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(1.0 / self.fps as f64));
        }
        let path = &self.frames[self.cursor];
        self.cursor = (self.cursor + 1) % self.frames.len();
        let img = image::open(path)
            .map_err(|e| RecorderError::Capture(format!("failed to read {:?}: {}", path, e)))?
            .to_rgb8();
        let (width, height) = (img.width(), img.height());
        Ok(RawFrame::new(img.into_raw(), width, height))
    }
}

impl CameraBackend for ReplayBackend {
    fn model(&self) -> CameraModel {
        CameraModel::FileReplay(self.root.to_string_lossy().to_string())
    }

    fn init(&mut self) -> Result<(), RecorderError> {
        if !self.root.is_dir() {
            return Err(RecorderError::DeviceInit(format!(
                "replay directory {:?} does not exist",
                self.root
            )));
        }

        let mut subdirs: Vec<PathBuf> = std::fs::read_dir(&self.root)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        subdirs.sort();

        if subdirs.is_empty() {
            if let Some(device) = device_from_dir(&self.root)? {
                self.devices.push(device);
            }
        } else {
            for dir in subdirs {
                if let Some(device) = device_from_dir(&dir)? {
                    self.devices.push(device);
                }
            }
        }

        if self.devices.is_empty() {
            return Err(RecorderError::DeviceInit(format!(
                "replay directory {:?} holds no frames",
                self.root
            )));
        }
        for dev in &self.devices {
            info!("replay device {} ({} frames)", dev.info.serial, dev.frames.len());
        }
        Ok(())
    }

    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn device_infos(&self) -> Vec<DeviceInfo> {
        self.devices.iter().map(|d| d.info.clone()).collect()
    }

    fn apply_setting(
        &mut self,
        device: usize,
        setting: &DeviceSetting,
    ) -> Result<(), RecorderError> {
        let dev = self.devices.get_mut(device).ok_or_else(|| {
            RecorderError::State(format!("no device at index {}", device))
        })?;
        if let DeviceSetting::SyncType(SyncType::Hardware) = setting {
            return Err(RecorderError::Capture(
                "replay source has no hardware sync line".to_string(),
            ));
        }
        debug!("{}: apply {:?}", dev.info.serial, setting);
        record_setting(&mut dev.info, setting);
        Ok(())
    }

    fn start_streaming(&mut self) -> Result<(), RecorderError> {
        if self.devices.is_empty() {
            return Err(RecorderError::State(
                "start_streaming before init".to_string(),
            ));
        }
        self.streaming = true;
        Ok(())
    }

    fn take_sources(&mut self) -> Result<Vec<Box<dyn FrameSource>>, RecorderError> {
        if !self.streaming {
            return Err(RecorderError::State(
                "take_sources before streaming started".to_string(),
            ));
        }
        if self.sources_taken {
            return Err(RecorderError::State(
                "sources already taken for this streaming session".to_string(),
            ));
        }
        self.sources_taken = true;
        Ok(self
            .devices
            .iter()
            .map(|dev| {
                Box::new(ReplaySource {
                    serial: dev.info.serial.clone(),
                    frames: dev.frames.clone(),
                    cursor: 0,
                    fps: dev.info.fps,
                }) as Box<dyn FrameSource>
            })
            .collect())
    }

    fn stop_streaming(&mut self) -> Result<(), RecorderError> {
        self.streaming = false;
        self.sources_taken = false;
        Ok(())
    }

    fn release(&mut self) -> Result<(), RecorderError> {
        self.streaming = false;
        self.sources_taken = false;
        self.devices.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_is_device_init_error() {
        let mut backend = ReplayBackend::new("/definitely/not/a/replay/dir");
        match backend.init() {
            Err(RecorderError::DeviceInit(_)) => {}
            other => panic!("expected DeviceInit error, got {:?}", other.err()),
        }
    }

    #[test]
    fn empty_directory_is_device_init_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = ReplayBackend::new(dir.path());
        assert!(matches!(
            backend.init(),
            Err(RecorderError::DeviceInit(_))
        ));
    }
}
