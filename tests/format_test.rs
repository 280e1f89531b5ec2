//! Property-Based Tests for the bin-video container and JPEG codec
//!
//! These tests verify invariants and contracts of the persistence layer
//! using proptest for input generation and shrinking.

use std::io::Cursor;

use proptest::prelude::*;
use tempfile::tempdir;

use gencam::codec::{JpegCoder, SoftJpegCoder};
use gencam::decode::{find_video_file, read_container};
use gencam::errors::RecorderError;
use gencam::types::{FramePayload, FrameRecord};
use gencam::video::{save_video, write_video, VideoHeader, VideoReader, VIDEO_EXTENSION};

fn arbitrary_payloads() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..16)
}

proptest! {
    /// INVARIANT: The header survives a byte round trip unchanged.
    #[test]
    fn header_round_trips(
        frame_count in any::<u32>(),
        width in any::<i32>(),
        height in any::<i32>(),
        quality in any::<i32>(),
    ) {
        let header = VideoHeader { frame_count, width, height, quality };
        let parsed = VideoHeader::read_from(&mut Cursor::new(header.to_bytes()))
            .expect("16 bytes always parse");
        prop_assert_eq!(parsed, header);
    }

    /// INVARIANT: A written container reads back exactly the payloads that
    /// went in, in order, and then reports end-of-entries.
    #[test]
    fn container_round_trips(payloads in arbitrary_payloads()) {
        let header = VideoHeader {
            frame_count: payloads.len() as u32,
            width: 64,
            height: 48,
            quality: 90,
        };
        let refs: Vec<&[u8]> = payloads.iter().map(|p| p.as_slice()).collect();
        let mut buf = Vec::new();
        write_video(&mut buf, &header, &refs).expect("in-memory write");

        let mut reader = VideoReader::new(Cursor::new(buf)).expect("header");
        for expected in &payloads {
            let got = reader.next_entry().expect("entry").expect("present");
            prop_assert_eq!(&got, expected);
        }
        prop_assert!(reader.next_entry().expect("past end").is_none());
    }

    /// INVARIANT: Trailing bytes after the declared entries never affect
    /// what the reader returns.
    #[test]
    fn trailing_bytes_are_ignored(
        payloads in arbitrary_payloads(),
        trailing in prop::collection::vec(any::<u8>(), 0..128),
    ) {
        let header = VideoHeader {
            frame_count: payloads.len() as u32,
            width: 64,
            height: 48,
            quality: 90,
        };
        let refs: Vec<&[u8]> = payloads.iter().map(|p| p.as_slice()).collect();
        let mut buf = Vec::new();
        write_video(&mut buf, &header, &refs).expect("in-memory write");
        buf.extend_from_slice(&trailing);

        let mut reader = VideoReader::new(Cursor::new(buf)).expect("header");
        let mut read = 0;
        while let Some(_) = reader.next_entry().expect("entry") {
            read += 1;
        }
        prop_assert_eq!(read, payloads.len());
    }

    /// INVARIANT: A header declaring more entries than the file holds is a
    /// truncated-file error, never a silent short read.
    #[test]
    fn overdeclared_count_is_truncation(
        payloads in arbitrary_payloads(),
        extra in 1u32..10,
    ) {
        let header = VideoHeader {
            frame_count: payloads.len() as u32,
            width: 64,
            height: 48,
            quality: 90,
        };
        let refs: Vec<&[u8]> = payloads.iter().map(|p| p.as_slice()).collect();
        let mut buf = Vec::new();
        write_video(&mut buf, &header, &refs).expect("in-memory write");
        let forged = header.frame_count + extra;
        buf[0..4].copy_from_slice(&forged.to_le_bytes());

        let mut reader = VideoReader::new(Cursor::new(buf)).expect("header");
        let mut result = Ok(Some(Vec::new()));
        for _ in 0..forged {
            result = reader.next_entry();
            if result.is_err() {
                break;
            }
        }
        prop_assert!(matches!(result, Err(RecorderError::TruncatedFile(_))));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// INVARIANT: Encoding then decoding preserves frame dimensions and
    /// byte count for any quality in the valid range.
    #[test]
    fn jpeg_codec_preserves_dimensions(
        quality in 1i32..=100,
        seed in 0u64..100,
    ) {
        let (width, height) = (64u32, 48u32);
        let frame = gencam::testing::synthetic_frame(seed, width, height);

        let mut coder = SoftJpegCoder::new();
        coder.init(width, height, quality, 0.0).expect("init");
        let jpeg = coder.encode(&frame).expect("encode");
        prop_assert!(!jpeg.is_empty());
        prop_assert!(jpeg.starts_with(&[0xff, 0xd8]), "JPEG SOI marker expected");

        let decoded = coder.decode(&jpeg).expect("decode");
        prop_assert_eq!(decoded.width, width);
        prop_assert_eq!(decoded.height, height);
        prop_assert_eq!(decoded.data.len(), (width * height * 3) as usize);
        coder.release();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SAVED CONTAINER CONTRACTS (plain tests, exercised through the decoder lookup)
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn saved_video_is_found_and_fully_readable() {
    let dir = tempdir().expect("tempdir");
    let frames: Vec<FrameRecord> = (0..4)
        .map(|sequence| FrameRecord {
            sequence,
            payload: FramePayload::Jpeg(vec![sequence as u8; 8]),
        })
        .collect();

    let path = save_video(dir.path(), "CAM42", (64, 48), &frames, 90).expect("save");
    assert_eq!(
        path.extension().and_then(|e| e.to_str()),
        Some(VIDEO_EXTENSION)
    );

    let found = find_video_file(dir.path(), "CAM42").expect("lookup");
    assert_eq!(found, path);

    let (header, payloads) = read_container(&found).expect("read");
    assert_eq!(header.frame_count, 4);
    assert_eq!(header.width, 64);
    assert_eq!(header.height, 48);
    assert_eq!(header.quality, 90);
    assert_eq!(payloads.len(), 4);
    for (sequence, payload) in payloads.iter().enumerate() {
        assert_eq!(payload, &vec![sequence as u8; 8]);
    }
}

#[test]
fn ambiguous_serial_lookup_fails() {
    let dir = tempdir().expect("tempdir");
    let frames = vec![FrameRecord {
        sequence: 0,
        payload: FramePayload::Jpeg(vec![1, 2, 3]),
    }];
    save_video(dir.path(), "CAM01", (4, 4), &frames, 90).expect("save");
    save_video(dir.path(), "CAM02", (4, 4), &frames, 90).expect("save");

    assert!(find_video_file(dir.path(), "CAM01").is_ok());
    assert!(matches!(
        find_video_file(dir.path(), "CAM"),
        Err(RecorderError::NotFound(_))
    ));
}
