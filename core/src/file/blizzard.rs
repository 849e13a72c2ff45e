//! Turbo Blizzard file decoder (Poland).
//!
//! A file opens with an empty synchronization block under a very long pilot,
//! then a 77-byte header and 1028-byte data blocks: 16-bit payload length,
//! 1024 payload bytes, a zero check byte, checksum. When adaptive speed
//! detection is on, the speed calibrated on the sync block is adopted for
//! the rest of the file.

use crate::block::BlizzardBlockDecoder;
use crate::dos2::looks_like_program_image;
use crate::filename::{output_name, polished_name};
use crate::logging::Severity;
use crate::pulse::SampleSource;

use super::{DecodeSession, ScanControl};

const PFX: &str = "BLIZZARD";

const HEADER_LEN: usize = 77;
const BLOCK_LEN: usize = 1028;
const FULL_PAYLOAD: usize = 1024;

enum BlockType {
    Full,
    Part(usize),
    Eof,
    Bad,
}

fn block_type(data: &[u8]) -> BlockType {
    // The byte after the payload must always be zero.
    if data[1026] != 0 {
        return BlockType::Bad;
    }
    let len = data[0] as usize | (data[1] as usize) << 8;
    match len {
        FULL_PAYLOAD => BlockType::Full,
        0 => BlockType::Eof,
        l if l < FULL_PAYLOAD => BlockType::Part(l),
        _ => BlockType::Bad,
    }
}

pub fn decode_file<S: SampleSource>(session: &mut DecodeSession<'_, S>) -> ScanControl {
    let rate = session.timer.sample_rate();
    let mut decoder = BlizzardBlockDecoder::new(rate, &session.config, false, 256);
    let mut sync_decoder = BlizzardBlockDecoder::new(rate, &session.config, true, 2_048);

    // Synchronization block: empty, only the pilot and sync marker.
    let mut first_file_sample;
    let sync_bdr = loop {
        first_file_sample = session.timer.position();
        let bdr = sync_decoder.decode_block(&mut session.timer, 0, session.log);

        if bdr.outcome.is_stream_fatal() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Stop;
        }
        if bdr.outcome.is_accepted() {
            break bdr;
        }
    };

    session.message(
        PFX,
        format!("SYNC BLOCK: <{}>", sync_bdr.describe()),
        sync_bdr.outcome.severity(),
    );

    if session.config.prefer_adaptive_speed_detection {
        decoder.adopt_speed(&sync_decoder);
    }

    // Header block. There is no magic to check beyond the checksum.
    let header_bdr = loop {
        let bdr = decoder.decode_block(&mut session.timer, HEADER_LEN, session.log);

        if bdr.outcome.is_stream_fatal() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Stop;
        }
        if bdr.outcome.is_accepted() {
            break bdr;
        }
    };

    let name = &header_bdr.bytes[..76];
    session.message(
        PFX,
        format!(
            "HEADER: {} <{}>",
            String::from_utf8_lossy(name),
            header_bdr.describe()
        ),
        header_bdr.outcome.severity(),
    );

    let mut assembled: Vec<u8> = Vec::new();
    let mut block_count = 0u32;

    loop {
        let bdr = decoder.decode_block(&mut session.timer, BLOCK_LEN, session.log);
        block_count += 1;

        if !bdr.outcome.is_accepted() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return if bdr.outcome.is_stream_fatal() {
                ScanControl::Stop
            } else {
                ScanControl::Continue
            };
        }

        if !bdr.outcome.is_perfect() {
            session.message(
                PFX,
                format!("BLOCK: {}: <{}>", block_count, bdr.describe()),
                bdr.outcome.severity(),
            );
        }

        let data = &bdr.bytes;
        match block_type(data) {
            BlockType::Full => assembled.extend_from_slice(&data[2..2 + FULL_PAYLOAD]),
            BlockType::Eof => break,
            BlockType::Part(len) => {
                assembled.extend_from_slice(&data[2..2 + len]);
                break;
            }
            BlockType::Bad => {
                session.message(
                    PFX,
                    format!("ERROR: Unknown block type {{{}}}", bdr.position),
                    Severity::Error,
                );
                return ScanControl::Continue;
            }
        }
    }

    let extension = if looks_like_program_image(&assembled) {
        ".xex"
    } else {
        ".blizdat"
    };
    let sample = session
        .config
        .prepend_sample_number
        .then_some(first_file_sample);
    let name = output_name(&polished_name(name), extension, sample);

    if session.save(PFX, &name, &assembled) {
        session.message(PFX, format!("SAVE: {name}"), Severity::Save);
    }

    ScanControl::Continue
}
