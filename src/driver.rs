//! The camera driver: one backend, its staged configuration, and the
//! per-device capture workers.
//!
//! Lifecycle: Uninitialized → `init` → Initialized → `start_capture` →
//! Capturing → `start_capture_threads` → Recording. The reverse operations
//! (`stop_capture_threads`, `stop_capture`, `release`) are idempotent and
//! safe to call from any state so early-error shutdown is always clean.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{info, warn};

use crate::backend::{create_backend, CameraBackend};
use crate::config::{
    BufferKind, CaptureConfig, CaptureMode, CapturePurpose, CommitReport, DeviceSelector,
    DeviceSetting, PipelineSetting, SettingStager,
};
use crate::errors::RecorderError;
use crate::session::{capture_loop, RecordingSession};
use crate::sync::SyncGate;
use crate::types::{CameraModel, DeviceInfo, ImageRatio, Switch, SyncType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Uninitialized,
    Initialized,
    Capturing,
    Recording,
}

pub struct CameraDriver {
    backend: Box<dyn CameraBackend>,
    state: DriverState,
    stager: SettingStager,
    config: CaptureConfig,
    gate: Arc<SyncGate>,
    stop: Arc<AtomicBool>,
    sessions: Vec<Arc<RecordingSession>>,
    workers: Vec<JoinHandle<()>>,
}

impl CameraDriver {
    pub fn new(model: CameraModel) -> Self {
        Self::with_backend(create_backend(model))
    }

    pub fn with_backend(backend: Box<dyn CameraBackend>) -> Self {
        Self {
            backend,
            state: DriverState::Uninitialized,
            stager: SettingStager::new(),
            config: CaptureConfig::default(),
            gate: Arc::new(SyncGate::open_from_start()),
            stop: Arc::new(AtomicBool::new(false)),
            sessions: Vec::new(),
            workers: Vec::new(),
        }
    }

    pub fn model_string(&self) -> String {
        match self.backend.model() {
            CameraModel::FileReplay(dir) => format!("FILE({})", dir),
            model => model.as_str().to_string(),
        }
    }

    /// Current live configuration (staged changes are invisible here).
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    // ---- lifecycle -------------------------------------------------------

    pub fn init(&mut self) -> Result<(), RecorderError> {
        if self.state != DriverState::Uninitialized {
            return Err(RecorderError::State("init called twice".to_string()));
        }
        self.backend.init()?;
        self.state = DriverState::Initialized;
        info!(
            "{}: initialized with {} device(s)",
            self.model_string(),
            self.backend.device_count()
        );
        Ok(())
    }

    /// Begins hardware streaming into the preview path; nothing is retained
    /// until capture threads run with an open gate.
    pub fn start_capture(&mut self) -> Result<(), RecorderError> {
        if self.state != DriverState::Initialized {
            return Err(RecorderError::State(format!(
                "start_capture requires the Initialized state (currently {:?})",
                self.state
            )));
        }
        self.backend.start_streaming()?;
        self.state = DriverState::Capturing;
        Ok(())
    }

    /// Spawns one capture worker per logical device.
    pub fn start_capture_threads(&mut self) -> Result<(), RecorderError> {
        if self.state != DriverState::Capturing {
            return Err(RecorderError::State(format!(
                "start_capture_threads requires the Capturing state (currently {:?})",
                self.state
            )));
        }
        if self.config.purpose != CapturePurpose::Recording {
            return Err(RecorderError::State(
                "capture purpose must be Recording before spawning capture threads".to_string(),
            ));
        }

        let sources = self.backend.take_sources()?;
        let target = self.config.target_frames();
        self.stop.store(false, Ordering::Release);

        for source in sources {
            let session = Arc::new(RecordingSession::new(source.serial(), target));
            self.sessions.push(session.clone());

            let gate = self.gate.clone();
            let stop = self.stop.clone();
            let config = self.config.clone();
            let handle = std::thread::Builder::new()
                .name(format!("gencam-capture-{}", source.serial()))
                .spawn(move || capture_loop(source, session, gate, stop, config))
                .map_err(|e| RecorderError::Capture(format!("spawn failed: {}", e)))?;
            self.workers.push(handle);
        }

        self.state = DriverState::Recording;
        Ok(())
    }

    /// Blocks until every device under this driver reached its target frame
    /// count. Returns immediately when already finished.
    pub fn wait_for_record_finish(&self) -> Result<(), RecorderError> {
        if self.sessions.is_empty() {
            return Err(RecorderError::State(
                "wait_for_record_finish before capture threads started".to_string(),
            ));
        }
        for session in &self.sessions {
            session.wait_finished()?;
        }
        Ok(())
    }

    /// Stops and joins the capture workers. Idempotent.
    pub fn stop_capture_threads(&mut self) {
        self.stop.store(true, Ordering::Release);
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("a capture worker panicked during shutdown");
            }
        }
        if self.state == DriverState::Recording {
            self.state = DriverState::Capturing;
        }
    }

    /// Stops hardware streaming. Idempotent.
    pub fn stop_capture(&mut self) {
        self.stop_capture_threads();
        if let Err(e) = self.backend.stop_streaming() {
            warn!("stop_streaming failed: {}", e);
        }
        if self.state == DriverState::Capturing {
            self.state = DriverState::Initialized;
        }
    }

    /// Releases devices and codec resources. Idempotent; safe even when
    /// earlier lifecycle stages never ran.
    pub fn release(&mut self) {
        self.stop_capture();
        if let Err(e) = self.backend.release() {
            warn!("release failed: {}", e);
        }
        self.sessions.clear();
        self.state = DriverState::Uninitialized;
    }

    // ---- staged settings -------------------------------------------------

    fn ensure_stageable(&self, what: &str) -> Result<(), RecorderError> {
        match self.state {
            DriverState::Initialized | DriverState::Capturing => Ok(()),
            DriverState::Uninitialized => Err(RecorderError::State(format!(
                "{} before init",
                what
            ))),
            DriverState::Recording => Err(RecorderError::State(format!(
                "{} while recording: settings staged after start_capture_threads are undefined",
                what
            ))),
        }
    }

    pub fn set_sync_type(
        &mut self,
        selector: DeviceSelector,
        sync_type: SyncType,
    ) -> Result<(), RecorderError> {
        self.ensure_stageable("set_sync_type")?;
        self.stager
            .stage_device(selector, DeviceSetting::SyncType(sync_type));
        Ok(())
    }

    pub fn set_fps(&mut self, selector: DeviceSelector, fps: f32) -> Result<(), RecorderError> {
        self.ensure_stageable("set_fps")?;
        self.stager
            .stage_device(selector, DeviceSetting::Fps(fps));
        Ok(())
    }

    /// Exposure time in microseconds.
    pub fn set_exposure(
        &mut self,
        selector: DeviceSelector,
        exposure_us: f64,
    ) -> Result<(), RecorderError> {
        self.ensure_stageable("set_exposure")?;
        self.stager
            .stage_device(selector, DeviceSetting::Exposure(exposure_us));
        Ok(())
    }

    pub fn set_auto_exposure(
        &mut self,
        selector: DeviceSelector,
        switch: Switch,
    ) -> Result<(), RecorderError> {
        self.ensure_stageable("set_auto_exposure")?;
        self.stager
            .stage_device(selector, DeviceSetting::AutoExposure(switch));
        Ok(())
    }

    pub fn set_auto_exposure_level(
        &mut self,
        selector: DeviceSelector,
        level: i32,
    ) -> Result<(), RecorderError> {
        self.ensure_stageable("set_auto_exposure_level")?;
        self.stager
            .stage_device(selector, DeviceSetting::AutoExposureLevel(level));
        Ok(())
    }

    pub fn set_auto_exposure_compensation(
        &mut self,
        selector: DeviceSelector,
        switch: Switch,
        value: f32,
    ) -> Result<(), RecorderError> {
        self.ensure_stageable("set_auto_exposure_compensation")?;
        self.stager.stage_device(
            selector,
            DeviceSetting::AutoExposureCompensation(switch, value),
        );
        Ok(())
    }

    pub fn set_white_balance(
        &mut self,
        selector: DeviceSelector,
        red: f32,
        green: f32,
        blue: f32,
    ) -> Result<(), RecorderError> {
        self.ensure_stageable("set_white_balance")?;
        self.stager
            .stage_device(selector, DeviceSetting::WhiteBalance(red, green, blue));
        Ok(())
    }

    /// One ratio per device, index-aligned with `get_cam_infos`.
    pub fn set_image_ratios(&mut self, ratios: Vec<ImageRatio>) -> Result<(), RecorderError> {
        self.ensure_stageable("set_image_ratios")?;
        for (index, ratio) in ratios.into_iter().enumerate() {
            self.stager
                .stage_device(DeviceSelector::Index(index), DeviceSetting::ImageRatio(ratio));
        }
        Ok(())
    }

    pub fn set_cam_buffer_type(&mut self, kind: BufferKind) -> Result<(), RecorderError> {
        self.ensure_stageable("set_cam_buffer_type")?;
        self.stager.stage_pipeline(PipelineSetting::BufferKind(kind));
        Ok(())
    }

    pub fn set_jpeg_quality(
        &mut self,
        quality: i32,
        gpu_reserve_ratio: f32,
    ) -> Result<(), RecorderError> {
        self.ensure_stageable("set_jpeg_quality")?;
        self.stager
            .stage_pipeline(PipelineSetting::JpegQuality(quality, gpu_reserve_ratio));
        Ok(())
    }

    pub fn set_capture_mode(&mut self, mode: CaptureMode) -> Result<(), RecorderError> {
        self.ensure_stageable("set_capture_mode")?;
        self.stager.stage_pipeline(PipelineSetting::CaptureMode(mode));
        Ok(())
    }

    pub fn set_capture_purpose(&mut self, purpose: CapturePurpose) -> Result<(), RecorderError> {
        self.ensure_stageable("set_capture_purpose")?;
        self.stager.stage_pipeline(PipelineSetting::Purpose(purpose));
        Ok(())
    }

    pub fn set_verbose(&mut self, verbose: bool) -> Result<(), RecorderError> {
        self.ensure_stageable("set_verbose")?;
        self.stager.stage_pipeline(PipelineSetting::Verbose(verbose));
        Ok(())
    }

    /// Commits the whole pending map. Individual field failures are reported
    /// and logged but do not abort the commit; the caller re-verifies via
    /// `get_cam_infos`.
    pub fn make_set_effective(&mut self) -> Result<CommitReport, RecorderError> {
        self.ensure_stageable("make_set_effective")?;
        let report = self.stager.commit(self.backend.as_mut(), &mut self.config);
        for failure in &report.failures {
            warn!(
                "commit: device {} {:?} not applied: {}",
                failure.device, failure.kind, failure.message
            );
        }
        Ok(report)
    }

    /// Snapshot of the devices; valid in any state after `init`.
    pub fn get_cam_infos(&self) -> Result<Vec<DeviceInfo>, RecorderError> {
        if self.state == DriverState::Uninitialized {
            return Err(RecorderError::State("get_cam_infos before init".to_string()));
        }
        Ok(self.backend.device_infos())
    }

    // ---- synchronization gate --------------------------------------------

    /// Replaces this driver's gate so several drivers (all cameras of one
    /// recording invocation) share a single retain flag. Must happen before
    /// capture threads start.
    pub fn use_sync_gate(&mut self, gate: Arc<SyncGate>) -> Result<(), RecorderError> {
        if self.state == DriverState::Recording {
            return Err(RecorderError::State(
                "cannot swap the sync gate while recording".to_string(),
            ));
        }
        self.gate = gate;
        Ok(())
    }

    pub fn sync_gate(&self) -> Arc<SyncGate> {
        self.gate.clone()
    }

    // ---- persistence -----------------------------------------------------

    fn finished_sessions(&self) -> Result<&[Arc<RecordingSession>], RecorderError> {
        if self.sessions.is_empty() {
            return Err(RecorderError::State(
                "nothing recorded: capture threads never started".to_string(),
            ));
        }
        for session in &self.sessions {
            if !session.is_finished() {
                return Err(RecorderError::State(format!(
                    "{}: recording not finished ({}/{} frames)",
                    session.serial(),
                    session.len(),
                    session.target()
                )));
            }
            if session.is_drained() {
                return Err(RecorderError::State(format!(
                    "{}: frames already persisted",
                    session.serial()
                )));
            }
        }
        Ok(&self.sessions)
    }

    /// Writes every session's frames as individual JPEG files.
    pub fn save_images(&mut self, dir: impl AsRef<Path>) -> Result<usize, RecorderError> {
        let quality = self.config.jpeg_quality;
        let reserve = self.config.gpu_reserve_ratio;
        let mut total = 0;
        for session in self.finished_sessions()? {
            let dims = session.dimensions().unwrap_or((0, 0));
            let frames = session.take_frames();
            total += crate::video::save_images(
                dir.as_ref(),
                session.serial(),
                dims,
                &frames,
                quality,
                reserve,
            )?;
        }
        Ok(total)
    }

    /// Writes one bin-video container per session (GPU/JPEG path only).
    pub fn save_videos_gpu(
        &mut self,
        dir: impl AsRef<Path>,
    ) -> Result<Vec<PathBuf>, RecorderError> {
        if self.config.buffer_kind != BufferKind::Jpeg {
            return Err(RecorderError::UnsupportedBufferType(
                "video save requires the JPEG buffer type".to_string(),
            ));
        }
        let quality = self.config.jpeg_quality;
        let mut paths = Vec::new();
        for session in self.finished_sessions()? {
            let dims = session.dimensions().unwrap_or((0, 0));
            let frames = session.take_frames();
            paths.push(crate::video::save_video(
                dir.as_ref(),
                session.serial(),
                dims,
                &frames,
                quality,
            )?);
        }
        Ok(paths)
    }

    /// Live sessions, exposed for progress inspection.
    pub fn sessions(&self) -> &[Arc<RecordingSession>] {
        &self.sessions
    }
}

impl Drop for CameraDriver {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testutil::ScriptedBackend;
    use crate::config::SettingKind;

    fn recording_ready(backend: ScriptedBackend, target: usize) -> CameraDriver {
        let mut driver = CameraDriver::with_backend(Box::new(backend));
        driver.init().unwrap();
        driver.set_cam_buffer_type(BufferKind::Jpeg).unwrap();
        driver
            .set_capture_mode(CaptureMode::Continuous {
                target_frames: target,
            })
            .unwrap();
        driver.set_capture_purpose(CapturePurpose::Recording).unwrap();
        driver.make_set_effective().unwrap();
        driver.start_capture().unwrap();
        driver
    }

    #[test]
    fn lifecycle_order_is_enforced() {
        let mut driver = CameraDriver::with_backend(Box::new(ScriptedBackend::with_devices(1)));
        assert!(matches!(
            driver.start_capture(),
            Err(RecorderError::State(_))
        ));
        assert!(matches!(
            driver.set_fps(DeviceSelector::All, 10.0),
            Err(RecorderError::State(_))
        ));
        driver.init().unwrap();
        assert!(matches!(
            driver.start_capture_threads(),
            Err(RecorderError::State(_))
        ));
    }

    #[test]
    fn staging_rejected_while_recording() {
        let mut driver = recording_ready(ScriptedBackend::with_devices(1), 2);
        driver.start_capture_threads().unwrap();
        assert!(matches!(
            driver.set_exposure(DeviceSelector::All, 1000.0),
            Err(RecorderError::State(_))
        ));
        driver.wait_for_record_finish().unwrap();
        driver.stop_capture_threads();
        driver.release();
    }

    #[test]
    fn full_record_cycle_hits_exact_target() {
        let mut driver = recording_ready(ScriptedBackend::with_devices(2), 5);
        driver.start_capture_threads().unwrap();
        driver.wait_for_record_finish().unwrap();
        for session in driver.sessions() {
            assert_eq!(session.len(), 5);
        }
        let dir = tempfile::tempdir().unwrap();
        let paths = driver.save_videos_gpu(dir.path()).unwrap();
        assert_eq!(paths.len(), 2);
        driver.stop_capture_threads();
        driver.stop_capture();
        driver.release();
    }

    #[test]
    fn teardown_is_idempotent() {
        let mut driver = recording_ready(ScriptedBackend::with_devices(1), 1);
        driver.start_capture_threads().unwrap();
        driver.wait_for_record_finish().unwrap();
        driver.stop_capture_threads();
        driver.stop_capture_threads();
        driver.stop_capture();
        driver.stop_capture();
        driver.release();
        driver.release();
    }

    #[test]
    fn release_without_any_capture_is_safe() {
        let mut driver = CameraDriver::with_backend(Box::new(ScriptedBackend::with_devices(1)));
        driver.release();
        driver.release();
    }

    #[test]
    fn serial_substring_exposure_targets_one_device() {
        let backend = ScriptedBackend::with_serials(&["AAA111", "BBB222"]);
        let mut driver = CameraDriver::with_backend(Box::new(backend));
        driver.init().unwrap();

        // Per-serial override: only devices whose serial contains "AAA".
        let infos = driver.get_cam_infos().unwrap();
        for (index, info) in infos.iter().enumerate() {
            if info.serial.contains("AAA") {
                driver
                    .set_exposure(DeviceSelector::Index(index), 10_000.0)
                    .unwrap();
            }
        }
        let report = driver.make_set_effective().unwrap();
        assert!(report.is_complete());

        let infos = driver.get_cam_infos().unwrap();
        assert_eq!(infos[0].exposure_us, 10_000.0);
        assert_eq!(infos[1].exposure_us, 0.0);
    }

    #[test]
    fn second_persistence_pass_is_state_error() {
        let mut driver = recording_ready(ScriptedBackend::with_devices(1), 2);
        driver.start_capture_threads().unwrap();
        driver.wait_for_record_finish().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let paths = driver.save_videos_gpu(dir.path()).unwrap();
        assert_eq!(paths.len(), 1);
        // Frames were drained; a second save must not silently write nothing.
        assert!(matches!(
            driver.save_images(dir.path()),
            Err(RecorderError::State(_))
        ));
        assert!(matches!(
            driver.save_videos_gpu(dir.path()),
            Err(RecorderError::State(_))
        ));
        driver.release();
    }

    #[test]
    fn sync_type_respects_device_selector() {
        let mut backend = ScriptedBackend::with_devices(2);
        backend.fail_on = Some((0, SettingKind::SyncType));
        let mut driver = CameraDriver::with_backend(Box::new(backend));
        driver.init().unwrap();

        driver
            .set_sync_type(DeviceSelector::Index(1), SyncType::Software)
            .unwrap();
        let report = driver.make_set_effective().unwrap();
        assert!(report.is_complete(), "index selector must skip device 0");

        driver
            .set_sync_type(DeviceSelector::All, SyncType::Software)
            .unwrap();
        let report = driver.make_set_effective().unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].device, 0);
    }

    #[test]
    fn save_before_finish_is_state_error() {
        let mut driver = recording_ready(ScriptedBackend::with_devices(1), 1);
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            driver.save_images(dir.path()),
            Err(RecorderError::State(_))
        ));
    }

    #[test]
    fn video_save_requires_jpeg_buffers() {
        let mut driver = CameraDriver::with_backend(Box::new(ScriptedBackend::with_devices(1)));
        driver.init().unwrap();
        driver
            .set_capture_mode(CaptureMode::Continuous { target_frames: 1 })
            .unwrap();
        driver.set_capture_purpose(CapturePurpose::Recording).unwrap();
        driver.make_set_effective().unwrap();
        driver.start_capture().unwrap();
        driver.start_capture_threads().unwrap();
        driver.wait_for_record_finish().unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            driver.save_videos_gpu(dir.path()),
            Err(RecorderError::UnsupportedBufferType(_))
        ));
        driver.release();
    }
}
