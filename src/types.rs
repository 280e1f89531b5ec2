//! Core data types shared across the capture pipeline.

use serde::{Deserialize, Serialize};

/// Camera family selected at construction time. Closed set: one variant per
/// supported backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraModel {
    /// Hardware family A (industrial USB3 cameras).
    Ximea,
    /// Hardware family B (industrial USB3 cameras).
    PtGrey,
    /// Synthetic stereo pair (two virtual devices).
    Stereo,
    /// Replays frames from a directory of image files.
    FileReplay(String),
}

impl CameraModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraModel::Ximea => "XIMEA",
            CameraModel::PtGrey => "PTGREY",
            CameraModel::Stereo => "STEREO",
            CameraModel::FileReplay(_) => "FILE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncType {
    Software,
    Hardware,
}

/// On/off toggle for staged device settings (auto exposure and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Switch {
    On,
    Off,
}

/// Crop/binning selector applied per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageRatio {
    Full,
    Half,
    Quarter,
}

impl Default for ImageRatio {
    fn default() -> Self {
        ImageRatio::Full
    }
}

/// Snapshot of one logical device's identity and current settings.
///
/// `serial` is unique per physical device; `width`/`height` are immutable
/// once the first commit has run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub serial: String,
    pub width: u32,
    pub height: u32,
    /// Exposure time in microseconds.
    pub exposure_us: f64,
    pub auto_exposure: Switch,
    pub brightness_level: i32,
    /// White balance gains (red, green, blue).
    pub white_balance: (f32, f32, f32),
    pub fps: f32,
    pub image_ratio: ImageRatio,
}

impl DeviceInfo {
    pub fn new(serial: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            serial: serial.into(),
            width,
            height,
            exposure_us: 0.0,
            auto_exposure: Switch::Off,
            brightness_level: 40,
            white_balance: (1.0, 1.0, 1.0),
            fps: 0.0,
            image_ratio: ImageRatio::Full,
        }
    }
}

/// One raw frame pulled from a device's streaming path. RGB8, tightly packed.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data,
        }
    }
}

/// Frame payload as buffered by a recording session.
#[derive(Debug, Clone)]
pub enum FramePayload {
    Raw(Vec<u8>),
    Jpeg(Vec<u8>),
}

impl FramePayload {
    pub fn len(&self) -> usize {
        match self {
            FramePayload::Raw(d) | FramePayload::Jpeg(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            FramePayload::Raw(d) | FramePayload::Jpeg(d) => d,
        }
    }
}

/// A retained frame. Produced by exactly one capture worker, consumed by the
/// persistence pipeline, never mutated after creation.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// Monotonic per device, starting at 0.
    pub sequence: u64,
    pub payload: FramePayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_info_defaults() {
        let info = DeviceInfo::new("CAM0001", 640, 480);
        assert_eq!(info.serial, "CAM0001");
        assert_eq!(info.brightness_level, 40);
        assert_eq!(info.image_ratio, ImageRatio::Full);
    }

    #[test]
    fn payload_len_matches_bytes() {
        let p = FramePayload::Jpeg(vec![0xff, 0xd8, 0xff]);
        assert_eq!(p.len(), 3);
        assert_eq!(p.bytes().len(), 3);
    }

    #[test]
    fn device_info_json_round_trips() {
        let mut info = DeviceInfo::new("CAM0001", 640, 480);
        info.exposure_us = 5000.0;
        info.auto_exposure = Switch::On;
        info.white_balance = (1.8, 1.0, 2.1);

        let json = serde_json::to_string(&info).unwrap();
        let back: DeviceInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.serial, "CAM0001");
        assert_eq!(back.width, 640);
        assert_eq!(back.exposure_us, 5000.0);
        assert_eq!(back.auto_exposure, Switch::On);
        assert_eq!(back.white_balance, (1.8, 1.0, 2.1));
        assert_eq!(back.image_ratio, ImageRatio::Full);
    }

    #[test]
    fn model_strings() {
        assert_eq!(CameraModel::Ximea.as_str(), "XIMEA");
        assert_eq!(CameraModel::FileReplay("./mp4s".into()).as_str(), "FILE");
    }
}
