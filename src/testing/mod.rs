//! Synthetic frame generation for offline testing and the stereo backend.

use crate::types::RawFrame;

/// Deterministic RGB gradient frame. Content varies with `frame_number` so
/// consecutive frames differ, which matters for encoder tests.
pub fn synthetic_frame(frame_number: u64, width: u32, height: u32) -> RawFrame {
    let mut data = vec![0u8; (width * height * 3) as usize];
    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }
    RawFrame::new(data, width, height)
}
