//! GenCam: synchronized multi-camera capture and recording
//!
//! This crate drives heterogeneous camera arrays through a single generic
//! driver: staged two-phase configuration, per-device capture threads, a
//! shared start gate with an optional UDP trigger, and persistence as JPEG
//! files or a compact bin-video container.
//!
//! # Usage
//! ```rust,ignore
//! use gencam::driver::CameraDriver;
//! use gencam::types::CameraModel;
//! use gencam::config::DeviceSelector;
//!
//! let mut driver = CameraDriver::new(CameraModel::Stereo);
//! driver.init()?;
//! driver.set_fps(DeviceSelector::All, 10.0)?;
//! driver.make_set_effective()?;
//! driver.start_capture()?;
//! driver.start_capture_threads()?;
//! driver.wait_for_record_finish()?;
//! ```

pub mod backend;
pub mod cli;
pub mod codec;
pub mod config;
pub mod decode;
pub mod driver;
pub mod errors;
pub mod mp4;
pub mod session;
pub mod sync;
pub mod types;
pub mod video;

// Testing utilities - synthetic data for offline testing
pub mod testing;

// Re-exports for convenience
pub use config::{CaptureConfig, CapturePurpose, DeviceSelector};
pub use driver::CameraDriver;
pub use errors::RecorderError;
pub use types::{CameraModel, DeviceInfo, SyncType};

/// Initialize logging for the recorder
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "gencam=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
