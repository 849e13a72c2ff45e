//! Turbo Tape recovery state machine tests: duplicate replacement, bad
//! sequence handling, forced forward progress.

mod common;

use common::*;
use std::path::PathBuf;
use tapedec_core::file::{decode_file, DecodeSession, ScanControl, TapeFormat};
use tapedec_core::logging::MemoryLog;
use tapedec_core::pulse::PulseTimer;
use tapedec_core::writer::MemoryWriter;
use tapedec_core::DecoderConfig;

const RATE: u32 = 44_100;

const BLOCK_LEN: usize = 1_026;
const MODE_SD: u8 = 192;

/// Build one raw Turbo Tape block: sequence number, mode, valid-byte count
/// with the EOF flag, an 8.3 name, payload, XOR checksum.
fn tt_block(seq: u8, mode: u8, fill: u8, valid_payload: usize, eof: bool) -> Vec<u8> {
    let mut raw = vec![0u8; BLOCK_LEN];
    raw[0] = seq;
    raw[1] = mode;
    let vb = 16 + valid_payload;
    raw[2] = (vb & 0xFF) as u8;
    raw[3] = ((vb >> 8) as u8 & 0x7F) | if eof { 0x80 } else { 0 };
    raw[6..14].copy_from_slice(b"TESTFILE");
    raw[14..17].copy_from_slice(b"DAT");
    for b in &mut raw[17..17 + valid_payload] {
        *b = fill;
    }
    let checksum = raw[..BLOCK_LEN - 1].iter().fold(0u8, |a, &b| a ^ b);
    raw[BLOCK_LEN - 1] = checksum;
    raw
}

fn config() -> DecoderConfig {
    DecoderConfig {
        tolerate_bad_checksum: true,
        prepend_sample_number: false,
        verbose: false,
        ..DecoderConfig::default()
    }
}

fn run_decoder(train: PulseTrain) -> (ScanControl, MemoryLog, MemoryWriter) {
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
        decode_file(TapeFormat::TurboTape, &mut session)
    };
    (control, log, writer)
}

fn log_contains(log: &MemoryLog, needle: &str) -> bool {
    log.messages.iter().any(|m| m.text.contains(needle))
}

#[test]
fn perfect_duplicate_replaces_imperfect_block() {
    let b1 = tt_block(1, MODE_SD, 0x11, 100, false);
    let b2 = tt_block(2, MODE_SD, 0x22, 100, false);
    let mut b2_damaged = b2.clone();
    *b2_damaged.last_mut().unwrap() ^= 0x01; // checksum no longer matches
    let b3 = tt_block(3, MODE_SD, 0x33, 50, true);

    let mut train = PulseTrain::new();
    encode_st_block(&mut train, &b1, 300);
    encode_st_block(&mut train, &b2_damaged, 300);
    encode_st_block(&mut train, &b2, 300);
    encode_st_block(&mut train, &b3, 300);

    let (control, log, writer) = run_decoder(train);

    assert_eq!(control, ScanControl::Continue);
    assert_eq!(writer.files.len(), 1);

    let (name, data) = &writer.files[0];
    assert_eq!(name, "TESTFILE.DAT");

    let mut expected = vec![0x11u8; 100];
    expected.extend(vec![0x22u8; 100]);
    expected.extend(vec![0x33u8; 50]);
    assert_eq!(data, &expected);

    // The stored copy of block 2 was swapped for the perfect duplicate;
    // every retained block passed its checksum.
    assert!(log_contains(&log, "RESTORE FROM DUPLICATE: BLOCK: 2"));
    assert!(log_contains(&log, "SUCCESS: File decoded OK"));
}

#[test]
fn imperfect_lone_block_flags_the_file() {
    let b1 = tt_block(1, MODE_SD, 0x11, 100, false);
    let mut b2 = tt_block(2, MODE_SD, 0x22, 100, true);
    *b2.last_mut().unwrap() ^= 0x01;

    let mut train = PulseTrain::new();
    encode_st_block(&mut train, &b1, 300);
    encode_st_block(&mut train, &b2, 300);

    let (control, log, writer) = run_decoder(train);

    assert_eq!(control, ScanControl::Continue);
    assert_eq!(writer.files.len(), 1);
    assert!(log_contains(&log, "WARNING: File decoded with problems"));
}

#[test]
fn bad_sequence_aborts_without_storing_the_block() {
    let b1 = tt_block(1, MODE_SD, 0x11, 100, false);
    let b2 = tt_block(2, MODE_SD, 0x22, 100, false);
    let b5 = tt_block(5, MODE_SD, 0x55, 100, true);

    let mut train = PulseTrain::new();
    encode_st_block(&mut train, &b1, 300);
    encode_st_block(&mut train, &b2, 300);
    encode_st_block(&mut train, &b5, 300);

    let (control, log, writer) = run_decoder(train);

    assert_eq!(control, ScanControl::Continue);
    assert!(log_contains(&log, "FATAL ERROR: Incorrect sequence of blocks"));
    // Nothing was flushed; block 5 never joined the stored list.
    assert!(writer.files.is_empty());
}

#[test]
fn second_duplicate_in_a_row_is_a_sequence_error() {
    // After one duplicate the machine demands a successor.
    let b1 = tt_block(1, MODE_SD, 0x11, 100, false);
    let b2 = tt_block(2, MODE_SD, 0x22, 100, false);

    let mut train = PulseTrain::new();
    encode_st_block(&mut train, &b1, 300);
    encode_st_block(&mut train, &b2, 300);
    encode_st_block(&mut train, &b2, 300);
    encode_st_block(&mut train, &b2, 300);

    let (control, log, writer) = run_decoder(train);

    assert_eq!(control, ScanControl::Continue);
    assert!(log_contains(&log, "FATAL ERROR: Incorrect sequence of blocks"));
    assert!(writer.files.is_empty());
}

#[test]
fn file_starts_only_at_sequence_one() {
    // A stream opening mid-file (sequence 7) finds no file at all and the
    // scan ends at the end of the stream.
    let b7 = tt_block(7, MODE_SD, 0x77, 100, false);

    let mut train = PulseTrain::new();
    encode_st_block(&mut train, &b7, 300);

    let (control, _log, writer) = run_decoder(train);

    assert_eq!(control, ScanControl::Stop);
    assert!(writer.files.is_empty());
}
