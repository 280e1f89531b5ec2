//! Hardware family B: PointGrey-class industrial cameras.
//!
//! Unlike family A these stream demosaiced color, so white balance gains are
//! honored. Hardware sync is supported.

use log::{debug, info};

use super::{
    enumerate_native, record_setting, CameraBackend, FrameSource, NokhwaSource,
};
use crate::config::DeviceSetting;
use crate::errors::RecorderError;
use crate::types::{CameraModel, DeviceInfo};

const SERIAL_PREFIX: &str = "PTG";

pub struct PtGreyBackend {
    infos: Vec<DeviceInfo>,
    sources: Vec<NokhwaSource>,
    streaming: bool,
}

impl PtGreyBackend {
    pub fn new() -> Self {
        Self {
            infos: Vec::new(),
            sources: Vec::new(),
            streaming: false,
        }
    }
}

impl Default for PtGreyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraBackend for PtGreyBackend {
    fn model(&self) -> CameraModel {
        CameraModel::PtGrey
    }

    fn init(&mut self) -> Result<(), RecorderError> {
        let devices = enumerate_native(SERIAL_PREFIX)?;
        if devices.is_empty() {
            return Err(RecorderError::DeviceInit(
                "no PointGrey-family cameras reachable".to_string(),
            ));
        }
        for (index, info) in devices {
            let source = NokhwaSource::open(index, info.serial.clone())?;
            info!("opened {} (native index {})", info.serial, index);
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
        self.sources.clear();
        self.streaming = false;
        Ok(())
    }

    fn release(&mut self) -> Result<(), RecorderError> {
        self.sources.clear();
        self.infos.clear();
        self.streaming = false;
        Ok(())
    }
}
