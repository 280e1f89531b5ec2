//! Capture configuration and the two-phase setting stager.
//!
//! Settings never hit the backend directly: phase one records them in a
//! pending map, phase two (`make_set_effective` on the driver) applies the
//! whole map as a single commit. This keeps the hardware from ever observing
//! a partially-applied configuration mid-stream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::backend::CameraBackend;
use crate::types::{ImageRatio, Switch, SyncType};

/// How frames are buffered by the capture workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferKind {
    Raw,
    Jpeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureMode {
    Continuous { target_frames: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapturePurpose {
    Recording,
    Preview,
}

/// The one live configuration per driver. Staged changes are invisible here
/// until committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub sync_type: SyncType,
    pub fps: f32,
    pub buffer_kind: BufferKind,
    pub jpeg_quality: i32,
    /// Share of codec memory reserved up front by the GPU coder. Passed
    /// through to the codec adapter; the software coder ignores it.
    pub gpu_reserve_ratio: f32,
    pub mode: CaptureMode,
    pub purpose: CapturePurpose,
    pub verbose: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sync_type: SyncType::Software,
            fps: 10.0,
            buffer_kind: BufferKind::Raw,
            jpeg_quality: 90,
            gpu_reserve_ratio: 0.75,
            mode: CaptureMode::Continuous { target_frames: 500 },
            purpose: CapturePurpose::Preview,
            verbose: false,
        }
    }
}

impl CaptureConfig {
    pub fn target_frames(&self) -> usize {
        match self.mode {
            CaptureMode::Continuous { target_frames } => target_frames,
        }
    }
}

/// Target of a staged per-device setting. `All` is the broadcast sentinel; it
/// expands to the devices known at commit time, not at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceSelector {
    All,
    Index(usize),
}

/// One staged hardware-facing setting.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceSetting {
    SyncType(SyncType),
    Fps(f32),
    /// Exposure time in microseconds.
    Exposure(f64),
    AutoExposure(Switch),
    AutoExposureLevel(i32),
    AutoExposureCompensation(Switch, f32),
    WhiteBalance(f32, f32, f32),
    ImageRatio(ImageRatio),
}

/// Field identity for the pending map: a later stage of the same (device,
/// field) pair overwrites the earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SettingKind {
    SyncType,
    Fps,
    Exposure,
    AutoExposure,
    AutoExposureLevel,
    AutoExposureCompensation,
    WhiteBalance,
    ImageRatio,
}

impl DeviceSetting {
    pub fn kind(&self) -> SettingKind {
        match self {
            DeviceSetting::SyncType(_) => SettingKind::SyncType,
            DeviceSetting::Fps(_) => SettingKind::Fps,
            DeviceSetting::Exposure(_) => SettingKind::Exposure,
            DeviceSetting::AutoExposure(_) => SettingKind::AutoExposure,
            DeviceSetting::AutoExposureLevel(_) => SettingKind::AutoExposureLevel,
            DeviceSetting::AutoExposureCompensation(_, _) => {
                SettingKind::AutoExposureCompensation
            }
            DeviceSetting::WhiteBalance(_, _, _) => SettingKind::WhiteBalance,
            DeviceSetting::ImageRatio(_) => SettingKind::ImageRatio,
        }
    }
}

/// Staged changes to the capture pipeline itself (not per-device hardware).
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineSetting {
    BufferKind(BufferKind),
    JpegQuality(i32, f32),
    CaptureMode(CaptureMode),
    Purpose(CapturePurpose),
    Verbose(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PipelineKind {
    BufferKind,
    JpegQuality,
    CaptureMode,
    Purpose,
    Verbose,
}

impl PipelineSetting {
    fn kind(&self) -> PipelineKind {
        match self {
            PipelineSetting::BufferKind(_) => PipelineKind::BufferKind,
            PipelineSetting::JpegQuality(_, _) => PipelineKind::JpegQuality,
            PipelineSetting::CaptureMode(_) => PipelineKind::CaptureMode,
            PipelineSetting::Purpose(_) => PipelineKind::Purpose,
            PipelineSetting::Verbose(_) => PipelineKind::Verbose,
        }
    }
}

/// One (device, field) application that failed during a commit. The commit
/// keeps going; the caller re-verifies via `get_cam_infos`.
#[derive(Debug, Clone)]
pub struct CommitFailure {
    pub device: usize,
    pub kind: SettingKind,
    pub message: String,
}

/// Result of `make_set_effective`: empty on full success.
#[derive(Debug, Clone, Default)]
pub struct CommitReport {
    pub failures: Vec<CommitFailure>,
}

impl CommitReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Pending-settings accumulator, cleared by every commit.
#[derive(Debug, Default)]
pub struct SettingStager {
    device: BTreeMap<(DeviceSelector, SettingKind), DeviceSetting>,
    pipeline: BTreeMap<PipelineKind, PipelineSetting>,
}

impl SettingStager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_device(&mut self, selector: DeviceSelector, setting: DeviceSetting) {
        self.device.insert((selector, setting.kind()), setting);
    }

    pub fn stage_pipeline(&mut self, setting: PipelineSetting) {
        self.pipeline.insert(setting.kind(), setting);
    }

    pub fn is_empty(&self) -> bool {
        self.device.is_empty() && self.pipeline.is_empty()
    }

    /// Number of staged (selector, field) entries, broadcast counted once.
    pub fn staged_len(&self) -> usize {
        self.device.len() + self.pipeline.len()
    }

    /// Applies the whole pending map and clears it. Broadcast entries expand
    /// to every device the backend knows right now and are applied before
    /// per-index entries, so an index-specific stage wins over a broadcast of
    /// the same field. Individual failures are collected, not fatal.
    pub fn commit(
        &mut self,
        backend: &mut dyn CameraBackend,
        live: &mut CaptureConfig,
    ) -> CommitReport {
        let mut report = CommitReport::default();
        let device_count = backend.device_count();

        let staged: Vec<_> = std::mem::take(&mut self.device).into_iter().collect();

        for ((selector, kind), setting) in staged.iter() {
            if *selector != DeviceSelector::All {
                continue;
            }
            for dev in 0..device_count {
                apply_one(backend, live, dev, setting, *kind, &mut report);
            }
        }
        for ((selector, kind), setting) in staged.iter() {
            if let DeviceSelector::Index(dev) = selector {
                if *dev >= device_count {
                    report.failures.push(CommitFailure {
                        device: *dev,
                        kind: *kind,
                        message: format!("device index {} out of range ({})", dev, device_count),
                    });
                    continue;
                }
                apply_one(backend, live, *dev, setting, *kind, &mut report);
            }
        }

        for (_, setting) in std::mem::take(&mut self.pipeline) {
            match setting {
                PipelineSetting::BufferKind(kind) => live.buffer_kind = kind,
                PipelineSetting::JpegQuality(quality, reserve) => {
                    live.jpeg_quality = quality;
                    live.gpu_reserve_ratio = reserve;
                }
                PipelineSetting::CaptureMode(mode) => live.mode = mode,
                PipelineSetting::Purpose(purpose) => live.purpose = purpose,
                PipelineSetting::Verbose(verbose) => live.verbose = verbose,
            }
        }

        report
    }
}

fn apply_one(
    backend: &mut dyn CameraBackend,
    live: &mut CaptureConfig,
    device: usize,
    setting: &DeviceSetting,
    kind: SettingKind,
    report: &mut CommitReport,
) {
    if let Err(e) = backend.apply_setting(device, setting) {
        report.failures.push(CommitFailure {
            device,
            kind,
            message: e.to_string(),
        });
        return;
    }
    match setting {
        DeviceSetting::SyncType(t) => live.sync_type = *t,
        DeviceSetting::Fps(fps) => live.fps = *fps,
        _ => {}
    }
}
