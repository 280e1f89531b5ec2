//! Per-device recording sessions and the capture worker loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use log::{debug, error, trace};

use crate::backend::FrameSource;
use crate::codec::{JpegCoder, SoftJpegCoder};
use crate::config::{BufferKind, CaptureConfig};
use crate::errors::RecorderError;
use crate::sync::SyncGate;
use crate::types::{FramePayload, FrameRecord};

struct SessionState {
    frames: Vec<FrameRecord>,
    dimensions: Option<(u32, u32)>,
    finished: bool,
    drained: bool,
    error: Option<String>,
}

/// Ordered frame store for one device. Owned by its capture worker while
/// recording, handed to the persistence pipeline afterwards. Insertion order
/// is sequence order; capacity is bounded only by memory (back-pressure is
/// never applied to the hardware).
pub struct RecordingSession {
    serial: String,
    target: usize,
    state: Mutex<SessionState>,
    cv: Condvar,
}

impl RecordingSession {
    pub fn new(serial: impl Into<String>, target: usize) -> Self {
        Self {
            serial: serial.into(),
            target,
            state: Mutex::new(SessionState {
                frames: Vec::new(),
                dimensions: None,
                // A zero-frame target is complete before it starts.
                finished: target == 0,
                drained: false,
                error: None,
            }),
            cv: Condvar::new(),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("lock poisoned").frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().expect("lock poisoned").finished
    }

    /// Geometry of the first retained frame.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.state.lock().expect("lock poisoned").dimensions
    }

    fn push(&self, record: FrameRecord, width: u32, height: u32) {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.dimensions.is_none() {
            state.dimensions = Some((width, height));
        }
        state.frames.push(record);
        if state.frames.len() >= self.target {
            state.finished = true;
            self.cv.notify_all();
        }
    }

    fn abort(&self, message: String) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.error = Some(message);
        state.finished = true;
        self.cv.notify_all();
    }

    /// Blocks until the target frame count is reached. Returns immediately
    /// when already finished; surfaces a worker failure as an error.
    pub fn wait_finished(&self) -> Result<(), RecorderError> {
        let mut state = self.state.lock().expect("lock poisoned");
        while !state.finished {
            state = self.cv.wait(state).expect("lock poisoned");
        }
        match &state.error {
            Some(msg) => Err(RecorderError::Capture(format!(
                "{}: capture worker failed: {}",
                self.serial, msg
            ))),
            None => Ok(()),
        }
    }

    /// True once the frames were handed to the persistence pipeline.
    pub fn is_drained(&self) -> bool {
        self.state.lock().expect("lock poisoned").drained
    }

    /// Drains the buffered frames for persistence. One-shot: the session is
    /// marked drained so a later persistence pass cannot silently write an
    /// empty result.
    pub fn take_frames(&self) -> Vec<FrameRecord> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.drained = true;
        std::mem::take(&mut state.frames)
    }
}

/// One worker per logical device. Pulls hardware-paced frames, discards them
/// while the gate is closed, retains (and optionally JPEG-encodes) them
/// until the session target is reached, then keeps draining so the hardware
/// pipeline never stalls, until the stop flag is raised.
pub(crate) fn capture_loop(
    mut source: Box<dyn FrameSource>,
    session: Arc<RecordingSession>,
    gate: Arc<SyncGate>,
    stop: Arc<AtomicBool>,
    config: CaptureConfig,
) {
    let mut coder = SoftJpegCoder::new();
    let mut coder_ready = false;
    let mut sequence: u64 = 0;
    let target = session.target() as u64;
    let verbose = config.verbose;

    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }

        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!("{}: {}", session.serial(), e);
                session.abort(e.to_string());
                break;
            }
        };

        if !gate.is_open() {
            // Pre-roll/preview frame: dropped, sequence untouched.
            trace!("{}: discarding pre-roll frame", session.serial());
            continue;
        }
        if sequence >= target {
            // Session complete; keep draining so capture timing holds.
            continue;
        }

        let payload = match config.buffer_kind {
            BufferKind::Raw => FramePayload::Raw(frame.data.clone()),
            BufferKind::Jpeg => {
                if !coder_ready {
                    if let Err(e) = coder.init(
                        frame.width,
                        frame.height,
                        config.jpeg_quality,
                        config.gpu_reserve_ratio,
                    ) {
                        error!("{}: {}", session.serial(), e);
                        session.abort(e.to_string());
                        break;
                    }
                    coder_ready = true;
                }
                match coder.encode(&frame) {
                    Ok(jpeg) => FramePayload::Jpeg(jpeg),
                    Err(e) => {
                        error!("{}: {}", session.serial(), e);
                        session.abort(e.to_string());
                        break;
                    }
                }
            }
        };

        session.push(FrameRecord { sequence, payload }, frame.width, frame.height);
        if verbose {
            debug!("{}: retained frame {}/{}", session.serial(), sequence + 1, target);
        }
        sequence += 1;
    }

    coder.release();
    debug!("{}: capture worker exiting", session.serial());
}
