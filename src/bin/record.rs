//! Multi-camera recorder binary.
//!
//! Builds one driver per device token, stages the shared recording
//! configuration on each, then starts every capture thread before opening
//! the gate so devices across drivers begin retaining frames together.

use std::process;
use std::sync::Arc;

use log::{error, info, warn};

use gencam::cli::{parse_args, RecordOptions, USAGE};
use gencam::config::{BufferKind, CaptureMode, CapturePurpose, DeviceSelector};
use gencam::driver::CameraDriver;
use gencam::errors::RecorderError;
use gencam::sync::{SyncGate, TriggerChannel, START_MARKER};
use gencam::types::{ImageRatio, Switch, SyncType};

fn main() {
    gencam::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match parse_args(&args) {
        Ok(opts) => opts,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", USAGE);
            process::exit(-1);
        }
    };
    if opts.help {
        println!("{}", USAGE);
        return;
    }

    // Bind the trigger port before touching any device so a peer sending
    // "Action" early is never lost to slow device initialization.
    let trigger = match opts.wait_port {
        Some(port) => match TriggerChannel::bind(port) {
            Ok(channel) => Some(channel),
            Err(e) => {
                error!("{}", e);
                process::exit(-1);
            }
        },
        None => None,
    };

    if let Err(e) = run(&opts, trigger) {
        error!("{}", e);
        process::exit(-1);
    }
}

fn run(opts: &RecordOptions, trigger: Option<TriggerChannel>) -> Result<(), RecorderError> {
    info!(
        "recording {} frame(s) from {} camera group(s), {} output, {} sync",
        opts.frame_count,
        opts.cameras.len(),
        if opts.video { "bin-video" } else { "image" },
        if opts.hard_sync { "hardware" } else { "software" },
    );
    match opts.exposure_ms {
        Some(ms) => info!("manual exposure {} ms", ms),
        None => info!("auto exposure, brightness level {}", opts.brightness),
    }
    for (sn, ms) in &opts.serial_exposures {
        info!("exposure override: serial \"{}\" -> {} ms", sn, ms);
    }

    let gate = if trigger.is_some() {
        Arc::new(SyncGate::closed())
    } else {
        Arc::new(SyncGate::open_from_start())
    };

    // A device group that fails setup is dropped; the others still record.
    let mut drivers: Vec<CameraDriver> = Vec::new();
    for model in &opts.cameras {
        let mut driver = CameraDriver::new(model.clone());
        match configure(&mut driver, opts, gate.clone()) {
            Ok(()) => drivers.push(driver),
            Err(e) => {
                error!("{}: setup failed, skipping: {}", driver.model_string(), e);
            }
        }
    }
    if drivers.is_empty() {
        return Err(RecorderError::DeviceInit(
            "no camera group completed setup".to_string(),
        ));
    }

    for driver in &mut drivers {
        driver.start_capture_threads()?;
    }
    if let Some(channel) = trigger {
        channel.wait_for(START_MARKER)?;
        gate.open();
    }

    let dir = match &opts.folder {
        Some(name) => name.clone(),
        None => chrono::Local::now()
            .format("__%Y_%m_%d_%H_%M_%S__")
            .to_string(),
    };

    for driver in &mut drivers {
        driver.wait_for_record_finish()?;
        if opts.video {
            let paths = driver.save_videos_gpu(&dir)?;
            info!("{}: wrote {} video file(s)", driver.model_string(), paths.len());
        } else {
            let count = driver.save_images(&dir)?;
            info!("{}: wrote {} image(s)", driver.model_string(), count);
        }
        for cam in driver.get_cam_infos()? {
            info!(
                "{}: {}x{} exposure {:.0}us fps {:.1}",
                cam.serial, cam.width, cam.height, cam.exposure_us, cam.fps
            );
        }
        driver.stop_capture_threads();
        driver.stop_capture();
        driver.release();
    }
    info!("saved to {}", dir);
    Ok(())
}

/// Brings one driver from cold to ready-to-record, with all settings staged
/// and committed. Commit failures on individual fields are logged by the
/// driver; they do not abort the run.
fn configure(
    driver: &mut CameraDriver,
    opts: &RecordOptions,
    gate: Arc<SyncGate>,
) -> Result<(), RecorderError> {
    driver.init()?;

    // First round: device-facing settings.
    if opts.hard_sync {
        driver.set_sync_type(DeviceSelector::All, SyncType::Hardware)?;
    }
    driver.set_fps(DeviceSelector::All, 10.0)?;
    match opts.exposure_ms {
        Some(ms) => driver.set_exposure(DeviceSelector::All, ms * 1000.0)?,
        None => {
            driver.set_auto_exposure(DeviceSelector::All, Switch::On)?;
            driver.set_auto_exposure_level(DeviceSelector::All, opts.brightness)?;
            driver.set_auto_exposure_compensation(DeviceSelector::All, Switch::On, -0.5)?;
        }
    }
    let infos = driver.get_cam_infos()?;
    for (sn, ms) in &opts.serial_exposures {
        let mut hit = false;
        for (index, info) in infos.iter().enumerate() {
            if info.serial.contains(sn.as_str()) {
                info!("{}: exposure override {} ms", info.serial, ms);
                driver.set_exposure(DeviceSelector::Index(index), ms * 1000.0)?;
                hit = true;
            }
        }
        if !hit {
            warn!("expsn \"{}\" matched no device of {}", sn, driver.model_string());
        }
    }
    driver.set_white_balance(DeviceSelector::All, 1.8, 1.0, 2.1)?;
    driver.make_set_effective()?;
    driver.start_capture()?;

    // Second round: capture pipeline.
    driver.set_cam_buffer_type(BufferKind::Jpeg)?;
    driver.set_jpeg_quality(90, 0.75)?;
    driver.set_capture_mode(CaptureMode::Continuous {
        target_frames: opts.frame_count,
    })?;
    driver.set_capture_purpose(CapturePurpose::Recording)?;
    driver.set_verbose(false)?;
    driver.make_set_effective()?;

    let infos = driver.get_cam_infos()?;
    driver.set_image_ratios(vec![ImageRatio::Full; infos.len()])?;
    driver.make_set_effective()?;

    driver.use_sync_gate(gate)?;
    Ok(())
}
