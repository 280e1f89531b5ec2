//! Synthetic stereo pair: two virtual devices producing deterministic
//! gradient frames, paced at the committed FPS. Used for bring-up of the
//! recording pipeline without hardware and by the integration tests.

use std::time::Duration;

use log::debug;

use super::{record_setting, CameraBackend, FrameSource};
use crate::config::DeviceSetting;
use crate::errors::RecorderError;
use crate::testing::synthetic_frame;
use crate::types::{CameraModel, DeviceInfo, RawFrame, SyncType};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;

pub struct StereoBackend {
    infos: Vec<DeviceInfo>,
    streaming: bool,
    sources_taken: bool,
}

impl StereoBackend {
    pub fn new() -> Self {
        Self {
            infos: Vec::new(),
            streaming: false,
            sources_taken: false,
        }
    }
}

impl Default for StereoBackend {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StereoSource {
    serial: String,
    fps: f32,
    counter: u64,
}

impl FrameSource for StereoSource {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn next_frame(&mut self) -> Result<RawFrame, RecorderError> {
        if self.fps > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(1.0 / self.fps as f64));
        }
        let frame = synthetic_frame(self.counter, WIDTH, HEIGHT);
        self.counter += 1;
        Ok(frame)
    }
}

impl CameraBackend for StereoBackend {
    fn model(&self) -> CameraModel {
        CameraModel::Stereo
    }

    fn init(&mut self) -> Result<(), RecorderError> {
        if self.infos.is_empty() {
            let mut left = DeviceInfo::new("STEREO-L-0001", WIDTH, HEIGHT);
            let mut right = DeviceInfo::new("STEREO-R-0001", WIDTH, HEIGHT);
            left.fps = 30.0;
            right.fps = 30.0;
            self.infos = vec![left, right];
        }
        Ok(())
    }

    fn device_count(&self) -> usize {
        self.infos.len()
    }

    fn device_infos(&self) -> Vec<DeviceInfo> {
        self.infos.clone()
    }

    fn apply_setting(
        &mut self,
        device: usize,
        setting: &DeviceSetting,
    ) -> Result<(), RecorderError> {
        let info = self.infos.get_mut(device).ok_or_else(|| {
            RecorderError::State(format!("no device at index {}", device))
        })?;
        if let DeviceSetting::SyncType(SyncType::Hardware) = setting {
            return Err(RecorderError::Capture(
                "synthetic pair has no hardware sync line".to_string(),
            ));
        }
        debug!("{}: apply {:?}", info.serial, setting);
        record_setting(info, setting);
        Ok(())
    }

    fn start_streaming(&mut self) -> Result<(), RecorderError> {
        if self.infos.is_empty() {
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
            .infos
            .iter()
            .map(|info| {
                Box::new(StereoSource {
                    serial: info.serial.clone(),
                    fps: info.fps,
                    counter: 0,
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
        self.infos.clear();
        Ok(())
    }
}
