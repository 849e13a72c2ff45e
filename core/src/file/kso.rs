//! KSO Turbo 2000 file decoder (Poland).
//!
//! A 13-byte header (magic 0, 255) followed by 3075-byte blocks: a 16-bit
//! payload length, 3072 payload bytes, checksum. Length 3072 is a full
//! block, 0 terminates the file, anything shorter is the final partial
//! block. Recordings made with the system loader carry one extra block
//! before the data, which is decoded and skipped.

use crate::block::KsoBlockDecoder;
use crate::config::KsoFileFormat;
use crate::dos2::looks_like_program_image;
use crate::filename::{output_name, polished_name};
use crate::logging::Severity;
use crate::pulse::SampleSource;

use super::{DecodeSession, ScanControl};

const PFX: &str = "KSO T2000";

const HEADER_LEN: usize = 13;
const BLOCK_LEN: usize = 3075;
const FULL_PAYLOAD: usize = 3072;

enum BlockType {
    Full,
    Part(usize),
    Eof,
    Bad,
}

fn block_type(data: &[u8]) -> BlockType {
    let len = data[0] as usize | (data[1] as usize) << 8;
    match len {
        FULL_PAYLOAD => BlockType::Full,
        0 => BlockType::Eof,
        l if l < FULL_PAYLOAD => BlockType::Part(l),
        _ => BlockType::Bad,
    }
}

pub fn decode_file<S: SampleSource>(session: &mut DecodeSession<'_, S>) -> ScanControl {
    let mut decoder = KsoBlockDecoder::new(session.timer.sample_rate(), &session.config);

    let mut first_file_sample;
    let header_bdr = loop {
        first_file_sample = session.timer.position();
        let bdr = decoder.decode_block(&mut session.timer, HEADER_LEN, session.log);

        if bdr.outcome.is_stream_fatal() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Stop;
        }
        if bdr.outcome.is_accepted() && bdr.bytes[0] == 0 && bdr.bytes[1] == 255 {
            break bdr;
        }
    };

    let name: [u8; 10] = header_bdr.bytes[2..12].try_into().expect("header length");
    session.message(
        PFX,
        format!(
            "HEADER: {} <{}>",
            String::from_utf8_lossy(&name),
            header_bdr.describe()
        ),
        header_bdr.outcome.severity(),
    );

    // Loader-convention recordings interleave one loader block before the
    // file data.
    if session.config.kso_file_format == KsoFileFormat::WithLoader {
        let bdr = decoder.decode_block(&mut session.timer, BLOCK_LEN, session.log);
        if !bdr.outcome.is_accepted() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
        } else {
            session.message(
                PFX,
                "Loader decoded and skipped".to_string(),
                Severity::Detail,
            );
        }
        if bdr.outcome.is_stream_fatal() {
            return ScanControl::Stop;
        }
    }

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
        ".ksodat"
    };
    let sample = session
        .config
        .prepend_sample_number
        .then_some(first_file_sample);
    let fname = output_name(&polished_name(&name), extension, sample);

    if session.save(PFX, &fname, &assembled) {
        session.message(PFX, format!("SAVE: {fname}"), Severity::Save);
    }

    ScanControl::Continue
}
