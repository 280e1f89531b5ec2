//! The closed polymorphic set of camera backends.
//!
//! One concrete backend per camera family or replay source, all behind the
//! [`CameraBackend`] capability trait and selected at construction time via
//! [`create_backend`]. SDK/register-level control of the hardware families is
//! an external concern; the backends here own enumeration, streaming
//! lifecycle, and best-effort application of committed settings.

pub mod ptgrey;
pub mod replay;
pub mod stereo;
pub mod ximea;

use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, RequestedFormat, RequestedFormatType},
    CallbackCamera,
};

use crate::config::DeviceSetting;
use crate::errors::RecorderError;
use crate::types::{CameraModel, DeviceInfo, RawFrame};

/// One logical device's streaming path. Blocking and hardware paced: the
/// capture worker that owns a source is the only caller.
pub trait FrameSource: Send {
    fn serial(&self) -> &str;
    fn next_frame(&mut self) -> Result<RawFrame, RecorderError>;
}

/// Capability contract every backend honors. Lifecycle operations past
/// `init` must be idempotent and safe to call even if the preceding state
/// was never reached, so early-error teardown stays clean.
pub trait CameraBackend: Send {
    fn model(&self) -> CameraModel;

    /// Enumerates physical or virtual sub-devices. Fails with a device-init
    /// error when hardware is unreachable or a replay directory is missing.
    fn init(&mut self) -> Result<(), RecorderError>;

    fn device_count(&self) -> usize;

    fn device_infos(&self) -> Vec<DeviceInfo>;

    /// Applies one committed setting to one device. Called only from a
    /// commit; never stages.
    fn apply_setting(&mut self, device: usize, setting: &DeviceSetting)
        -> Result<(), RecorderError>;

    /// Begins hardware streaming into the preview path (no retention).
    fn start_streaming(&mut self) -> Result<(), RecorderError>;

    /// Hands each device's streaming path to its capture worker. A source
    /// can be taken once per streaming session.
    fn take_sources(&mut self) -> Result<Vec<Box<dyn FrameSource>>, RecorderError>;

    fn stop_streaming(&mut self) -> Result<(), RecorderError>;

    fn release(&mut self) -> Result<(), RecorderError>;
}

/// Backend factory over the closed model set.
pub fn create_backend(model: CameraModel) -> Box<dyn CameraBackend> {
    match model {
        CameraModel::Ximea => Box::new(ximea::XimeaBackend::new()),
        CameraModel::PtGrey => Box::new(ptgrey::PtGreyBackend::new()),
        CameraModel::Stereo => Box::new(stereo::StereoBackend::new()),
        CameraModel::FileReplay(dir) => Box::new(replay::ReplayBackend::new(dir)),
    }
}

/// nokhwa-backed streaming path shared by the hardware families.
pub(crate) struct NokhwaSource {
    serial: String,
    camera: CallbackCamera,
}

impl NokhwaSource {
    pub(crate) fn open(index: u32, serial: String) -> Result<Self, RecorderError> {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
        let camera = CallbackCamera::new(
            nokhwa::utils::CameraIndex::Index(index),
            requested,
            |_| {},
        )
        .map_err(|e| RecorderError::DeviceInit(format!("failed to open camera {}: {}", index, e)))?;
        Ok(Self { serial, camera })
    }

    pub(crate) fn start(&mut self) -> Result<(), RecorderError> {
        self.camera
            .open_stream()
            .map_err(|e| RecorderError::Capture(format!("failed to start stream: {}", e)))
    }
}

impl FrameSource for NokhwaSource {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn next_frame(&mut self) -> Result<RawFrame, RecorderError> {
        let frame = self
            .camera
            .poll_frame()
            .map_err(|e| RecorderError::Capture(format!("failed to capture frame: {}", e)))?;
        Ok(RawFrame::new(
            frame.buffer_bytes().to_vec(),
            frame.resolution().width_x,
            frame.resolution().height_y,
        ))
    }
}

impl Drop for NokhwaSource {
    fn drop(&mut self) {
        let _ = self.camera.stop_stream();
    }
}

/// Enumerates native cameras, assigning serials under the family prefix.
pub(crate) fn enumerate_native(prefix: &str) -> Result<Vec<(u32, DeviceInfo)>, RecorderError> {
    let cameras = query(ApiBackend::Auto)
        .map_err(|e| RecorderError::DeviceInit(format!("failed to query cameras: {}", e)))?;

    let mut devices = Vec::new();
    for camera_info in cameras {
        let index = match camera_info.index() {
            nokhwa::utils::CameraIndex::Index(i) => *i,
            nokhwa::utils::CameraIndex::String(_) => continue,
        };
        let serial = format!("{}-{:04}-{}", prefix, index, camera_info.human_name());
        // Native enumeration reports no geometry until a stream is opened;
        // the first committed format fills these in.
        devices.push((index, DeviceInfo::new(serial, 0, 0)));
    }
    Ok(devices)
}

/// Records a committed setting into the backend's device snapshot.
pub(crate) fn record_setting(info: &mut DeviceInfo, setting: &DeviceSetting) {
    match setting {
        DeviceSetting::SyncType(_) => {}
        DeviceSetting::Fps(fps) => info.fps = *fps,
        DeviceSetting::Exposure(us) => {
            info.exposure_us = *us;
            info.auto_exposure = crate::types::Switch::Off;
        }
        DeviceSetting::AutoExposure(s) => info.auto_exposure = *s,
        DeviceSetting::AutoExposureLevel(level) => info.brightness_level = *level,
        DeviceSetting::AutoExposureCompensation(_, _) => {}
        DeviceSetting::WhiteBalance(r, g, b) => info.white_balance = (*r, *g, *b),
        DeviceSetting::ImageRatio(ratio) => info.image_ratio = *ratio,
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::config::SettingKind;
    use crate::testing::synthetic_frame;

    /// In-memory backend for unit tests: records applied settings and serves
    /// unpaced synthetic frames.
    pub struct ScriptedBackend {
        pub infos: Vec<DeviceInfo>,
        pub applied: Vec<(usize, DeviceSetting)>,
        pub fail_on: Option<(usize, SettingKind)>,
        pub initialized: bool,
        streaming: bool,
        sources_taken: bool,
    }

    impl ScriptedBackend {
        pub fn with_devices(count: usize) -> Self {
            let infos = (0..count)
                .map(|i| DeviceInfo::new(format!("TEST{:03}", i), 64, 48))
                .collect();
            Self {
                infos,
                applied: Vec::new(),
                fail_on: None,
                initialized: true,
                streaming: false,
                sources_taken: false,
            }
        }

        pub fn with_serials(serials: &[&str]) -> Self {
            let infos = serials
                .iter()
                .map(|s| DeviceInfo::new(s.to_string(), 64, 48))
                .collect();
            Self {
                infos,
                applied: Vec::new(),
                fail_on: None,
                initialized: true,
                streaming: false,
                sources_taken: false,
            }
        }
    }

    pub struct ScriptedSource {
        serial: String,
        counter: u64,
    }

    impl FrameSource for ScriptedSource {
        fn serial(&self) -> &str {
            &self.serial
        }

        fn next_frame(&mut self) -> Result<RawFrame, RecorderError> {
            let frame = synthetic_frame(self.counter, 64, 48);
            self.counter += 1;
            // Yield so gate/stop flags propagate between iterations in tests.
            std::thread::yield_now();
            Ok(frame)
        }
    }

    impl CameraBackend for ScriptedBackend {
        fn model(&self) -> CameraModel {
            CameraModel::Stereo
        }

        fn init(&mut self) -> Result<(), RecorderError> {
            self.initialized = true;
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
            if let Some((dev, kind)) = self.fail_on {
                if dev == device && kind == setting.kind() {
                    return Err(RecorderError::Capture(format!(
                        "scripted failure on device {}",
                        device
                    )));
                }
            }
            record_setting(&mut self.infos[device], setting);
            self.applied.push((device, setting.clone()));
            Ok(())
        }

        fn start_streaming(&mut self) -> Result<(), RecorderError> {
            self.streaming = true;
            Ok(())
        }

        fn take_sources(&mut self) -> Result<Vec<Box<dyn FrameSource>>, RecorderError> {
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
                    Box::new(ScriptedSource {
                        serial: info.serial.clone(),
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
            self.initialized = false;
            Ok(())
        }
    }
}
