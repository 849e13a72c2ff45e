//! End-to-end file decoding over synthetic tapes.

mod common;

use common::*;
use std::path::PathBuf;
use tapedec_core::file::{decode_file, scan, DecodeSession, ScanControl, TapeFormat};
use tapedec_core::logging::MemoryLog;
use tapedec_core::pulse::PulseTimer;
use tapedec_core::writer::MemoryWriter;
use tapedec_core::DecoderConfig;

const RATE: u32 = 44_100;

fn config() -> DecoderConfig {
    DecoderConfig {
        prepend_sample_number: false,
        verbose: false,
        ..DecoderConfig::default()
    }
}

/// 19-byte Turbo 2000 header.
fn t2k_header(name: &[u8; 10], file_type: u8, load: u16, length: u16, run: u16) -> Vec<u8> {
    let mut h = vec![0u8; 18];
    h[1] = file_type;
    h[2..12].copy_from_slice(name);
    h[12..14].copy_from_slice(&load.to_le_bytes());
    h[14..16].copy_from_slice(&length.to_le_bytes());
    h[16..18].copy_from_slice(&run.to_le_bytes());
    with_xor_checksum(&h)
}

#[test]
fn turbo2000_basic_file_decodes_to_payload() {
    let payload = [0xDEu8, 0xAD, 0xBE, 0xEF];
    let header = t2k_header(b"HELLO     ", 255, 0x2000, payload.len() as u16, 0x2000);
    let mut body = vec![255u8];
    body.extend_from_slice(&payload);
    let body = with_xor_checksum(&body);

    let mut train = PulseTrain::new();
    encode_block_msb(&mut train, &T2K_TIMING, &header, 300);
    encode_block_msb(&mut train, &T2K_TIMING, &body, 300);

    let mut log = MemoryLog::default();
    let mut writer = MemoryWriter::default();
    let control = {
        let mut session = DecodeSession::new(
            PulseTimer::new(train.into_source(RATE)),
            config(),
            PathBuf::from("."),
            &mut log,
            &mut writer,
        );
        decode_file(TapeFormat::Turbo2000, &mut session)
    };

    assert_eq!(control, ScanControl::Continue);
    assert_eq!(writer.files.len(), 1);
    let (name, data) = &writer.files[0];
    assert_eq!(name, "HELLO.bas");
    assert_eq!(data, &payload);
}

#[test]
fn turbo2000_native_binary_gets_dos_wrapper() {
    let payload = [0x01u8, 0x02, 0x03, 0x04];
    let header = t2k_header(b"GAME      ", 3, 0x2000, payload.len() as u16, 0x2468);
    let mut body = vec![255u8];
    body.extend_from_slice(&payload);
    let body = with_xor_checksum(&body);

    let mut train = PulseTrain::new();
    encode_block_msb(&mut train, &T2K_TIMING, &header, 300);
    encode_block_msb(&mut train, &T2K_TIMING, &body, 300);

    let mut log = MemoryLog::default();
    let mut writer = MemoryWriter::default();
    {
        let mut session = DecodeSession::new(
            PulseTimer::new(train.into_source(RATE)),
            config(),
            PathBuf::from("."),
            &mut log,
            &mut writer,
        );
        decode_file(TapeFormat::Turbo2000, &mut session);
    }

    assert_eq!(writer.files.len(), 1);
    let (name, data) = &writer.files[0];
    assert_eq!(name, "GAME.xex");

    let mut expected = vec![255u8, 255];
    expected.extend_from_slice(&0x2000u16.to_le_bytes()); // load
    expected.extend_from_slice(&0x2003u16.to_le_bytes()); // end
    expected.extend_from_slice(&payload);
    expected.extend_from_slice(&736u16.to_le_bytes());
    expected.extend_from_slice(&737u16.to_le_bytes());
    expected.extend_from_slice(&0x2468u16.to_le_bytes()); // run
    assert_eq!(data, &expected);
}

#[test]
fn garbage_before_header_is_skipped() {
    // Noise block with a non-zero magic byte, then a real file.
    let noise = with_xor_checksum(&[0x42u8; 18]);
    let payload = [0x55u8, 0x66];
    let header = t2k_header(b"SECOND    ", 255, 0, payload.len() as u16, 0);
    let mut body = vec![255u8];
    body.extend_from_slice(&payload);
    let body = with_xor_checksum(&body);

    let mut train = PulseTrain::new();
    encode_block_msb(&mut train, &T2K_TIMING, &noise, 300);
    encode_block_msb(&mut train, &T2K_TIMING, &header, 300);
    encode_block_msb(&mut train, &T2K_TIMING, &body, 300);

    let mut log = MemoryLog::default();
    let mut writer = MemoryWriter::default();
    {
        let mut session = DecodeSession::new(
            PulseTimer::new(train.into_source(RATE)),
            config(),
            PathBuf::from("."),
            &mut log,
            &mut writer,
        );
        decode_file(TapeFormat::Turbo2000, &mut session);
    }

    assert_eq!(writer.files.len(), 1);
    assert_eq!(writer.files[0].0, "SECOND.bas");
}

#[test]
fn kilobyte_blocks_reassemble_full_and_partial() {
    let mut header = vec![0u8; 18];
    header[2..18].copy_from_slice(b"KBFILE          ");
    let header = with_xor_checksum(&header);

    // One full kilobyte, a three-byte partial, then EOF.
    let mut full = vec![255u8];
    full.extend(vec![0xABu8; 1_024]);
    let full = with_xor_checksum(&full);

    let mut partial = vec![251u8];
    partial.extend_from_slice(&[1, 2, 3]);
    partial.extend(vec![0u8; 1_020]);
    partial.push(3); // tail length low byte
    let partial = with_xor_checksum(&partial);

    let eof = with_xor_checksum(&{
        let mut b = vec![250u8];
        b.extend(vec![0u8; 1_024]);
        b
    });

    let mut train = PulseTrain::new();
    encode_block_msb(&mut train, &T2K_TIMING, &header, 300);
    encode_block_msb(&mut train, &T2K_TIMING, &full, 300);
    encode_block_msb(&mut train, &T2K_TIMING, &partial, 300);
    encode_block_msb(&mut train, &T2K_TIMING, &eof, 300);

    let mut log = MemoryLog::default();
    let mut writer = MemoryWriter::default();
    {
        let mut session = DecodeSession::new(
            PulseTimer::new(train.into_source(RATE)),
            config(),
            PathBuf::from("."),
            &mut log,
            &mut writer,
        );
        decode_file(TapeFormat::KiloByteBlocks, &mut session);
    }

    assert_eq!(writer.files.len(), 1);
    let (name, data) = &writer.files[0];
    assert_eq!(name, "KBFILE.kbdat");

    let mut expected = vec![0xABu8; 1_024];
    expected.extend_from_slice(&[1, 2, 3]);
    assert_eq!(data, &expected);
}

#[test]
fn scan_decodes_every_file_then_stops() {
    let p1 = [0x10u8, 0x11];
    let h1 = t2k_header(b"FIRST     ", 255, 0, p1.len() as u16, 0);
    let mut b1 = vec![255u8];
    b1.extend_from_slice(&p1);
    let b1 = with_xor_checksum(&b1);

    let p2 = [0x20u8, 0x21, 0x22];
    let h2 = t2k_header(b"SECOND    ", 255, 0, p2.len() as u16, 0);
    let mut b2 = vec![255u8];
    b2.extend_from_slice(&p2);
    let b2 = with_xor_checksum(&b2);

    let mut train = PulseTrain::new();
    encode_block_msb(&mut train, &T2K_TIMING, &h1, 300);
    encode_block_msb(&mut train, &T2K_TIMING, &b1, 300);
    encode_block_msb(&mut train, &T2K_TIMING, &h2, 300);
    encode_block_msb(&mut train, &T2K_TIMING, &b2, 300);

    let mut log = MemoryLog::default();
    let mut writer = MemoryWriter::default();
    {
        let mut session = DecodeSession::new(
            PulseTimer::new(train.into_source(RATE)),
            config(),
            PathBuf::from("."),
            &mut log,
            &mut writer,
        );
        scan(TapeFormat::Turbo2000, &mut session);
    }

    let names: Vec<&str> = writer.files.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["FIRST.bas", "SECOND.bas"]);
}

#[test]
fn sample_number_prefix_appears_when_configured() {
    let payload = [0x99u8];
    let header = t2k_header(b"PFX       ", 255, 0, 1, 0);
    let mut body = vec![255u8];
    body.extend_from_slice(&payload);
    let body = with_xor_checksum(&body);

    let mut train = PulseTrain::new();
    encode_block_msb(&mut train, &T2K_TIMING, &header, 300);
    encode_block_msb(&mut train, &T2K_TIMING, &body, 300);

    let cfg = DecoderConfig {
        prepend_sample_number: true,
        verbose: false,
        ..DecoderConfig::default()
    };
    let mut log = MemoryLog::default();
    let mut writer = MemoryWriter::default();
    {
        let mut session = DecodeSession::new(
            PulseTimer::new(train.into_source(RATE)),
            cfg,
            PathBuf::from("."),
            &mut log,
            &mut writer,
        );
        decode_file(TapeFormat::Turbo2000, &mut session);
    }

    assert_eq!(writer.files.len(), 1);
    let name = &writer.files[0].0;
    // Ten zero-padded digits, an underscore, then the polished name.
    assert_eq!(name.len(), "0000000000_PFX.bas".len());
    assert!(name.ends_with("_PFX.bas"), "unexpected name {name}");
    assert!(name[..10].chars().all(|c| c.is_ascii_digit()));
}
