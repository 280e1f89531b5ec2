//! Decoder binary: bin-video container to playable MP4.

use std::path::Path;
use std::process;

use log::{error, info};

fn main() {
    gencam::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 3 {
        eprintln!("Usage: gencam-decode <input-dir> <serial> <output.mp4>");
        eprintln!("  <serial> must match exactly one container file name in <input-dir>");
        process::exit(-1);
    }

    let input_dir = Path::new(&args[0]);
    let serial = &args[1];
    let output = Path::new(&args[2]);

    match gencam::decode::decode_to_video(input_dir, serial, output) {
        Ok(frames) => info!("wrote {} frame(s) to {:?}", frames, output),
        Err(e) => {
            error!("{}", e);
            process::exit(-1);
        }
    }
}
