//! Hardware family A: XIMEA-class industrial cameras.
//!
//! Streams raw Bayer off the sensor, so white balance is not applied at the
//! camera; the commit reports it as a per-device failure and the caller
//! re-verifies. Hardware sync is supported.

use log::{debug, info};

use super::{
    enumerate_native, record_setting, CameraBackend, FrameSource, NokhwaSource,
};
use crate::config::DeviceSetting;
use crate::errors::RecorderError;
use crate::types::{CameraModel, DeviceInfo};

const SERIAL_PREFIX: &str = "XIC";

pub struct XimeaBackend {
    infos: Vec<DeviceInfo>,
    sources: Vec<NokhwaSource>,
    indices: Vec<u32>,
    streaming: bool,
}

impl XimeaBackend {
    pub fn new() -> Self {
        Self {
            infos: Vec::new(),
            sources: Vec::new(),
            indices: Vec::new(),
            streaming: false,
        }
    }
}

impl Default for XimeaBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraBackend for XimeaBackend {
    fn model(&self) -> CameraModel {
        CameraModel::Ximea
    }

    fn init(&mut self) -> Result<(), RecorderError> {
        let devices = enumerate_native(SERIAL_PREFIX)?;
        if devices.is_empty() {
            return Err(RecorderError::DeviceInit(
                "no XIMEA-family cameras reachable".to_string(),
            ));
        }
        for (index, info) in devices {
            let source = NokhwaSource::open(index, info.serial.clone())?;
            info!("opened {} (native index {})", info.serial, index);
            self.indices.push(index);
            self.infos.push(info);
            self.sources.push(source);
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
        if let DeviceSetting::WhiteBalance(_, _, _) = setting {
            return Err(RecorderError::Capture(
                "white balance unsupported in raw Bayer mode".to_string(),
            ));
        }
        debug!("{}: apply {:?}", info.serial, setting);
        record_setting(info, setting);
        Ok(())
    }

    fn start_streaming(&mut self) -> Result<(), RecorderError> {
        if self.streaming {
            return Ok(());
        }
        for source in &mut self.sources {
            source.start()?;
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
        if self.sources.is_empty() {
            return Err(RecorderError::State(
                "sources already taken for this streaming session".to_string(),
            ));
        }
        Ok(std::mem::take(&mut self.sources)
            .into_iter()
            .map(|s| Box::new(s) as Box<dyn FrameSource>)
            .collect())
    }

    fn stop_streaming(&mut self) -> Result<(), RecorderError> {
        // Sources still held here (threads never started) stop on drop.
        self.sources.clear();
        self.streaming = false;
        Ok(())
    }

    fn release(&mut self) -> Result<(), RecorderError> {
        self.sources.clear();
        self.infos.clear();
        self.indices.clear();
        self.streaming = false;
        Ok(())
    }
}
