//! Hard Turbo file decoder (Poland).
//!
//! A 41-byte main header names the file; the body alternates 6-byte segment
//! headers (identification byte 255, first and one-past-last addresses) and
//! segment data blocks, terminated by a header whose first address is
//! 0xFFFF. The output is assembled directly as a DOS 2 binary image.

use crate::block::Turbo2000BlockDecoder;
use crate::filename::{output_name, polished_name};
use crate::logging::Severity;
use crate::pulse::SampleSource;

use super::{DecodeSession, ScanControl};

const PFX: &str = "HT";

const MAIN_HEADER_LEN: usize = 41;
const SEGMENT_HEADER_LEN: usize = 6;

pub fn decode_file<S: SampleSource>(session: &mut DecodeSession<'_, S>) -> ScanControl {
    let mut decoder =
        Turbo2000BlockDecoder::new(session.timer.sample_rate(), &session.config, 256);

    // Main header: 39 name characters between a zero magic and the checksum.
    let mut first_file_sample;
    let mut main_header = loop {
        first_file_sample = session.timer.position();
        let bdr = decoder.decode_block(&mut session.timer, MAIN_HEADER_LEN, session.log);

        if bdr.outcome.is_stream_fatal() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Stop;
        }
        if bdr.outcome.is_accepted() && bdr.bytes[0] == 0 {
            break bdr;
        }
    };

    // ATASCII end-of-line inside the name renders as a space.
    for b in &mut main_header.bytes[1..40] {
        if *b == 155 {
            *b = b' ';
        }
    }
    let header_name: Vec<u8> = main_header.bytes[1..40].to_vec();
    session.message(
        PFX,
        format!(
            "Main header: {} <{}>",
            String::from_utf8_lossy(&header_name),
            main_header.describe()
        ),
        main_header.outcome.severity(),
    );

    let mut assembled = vec![255u8, 255];

    loop {
        let bdr = decoder.decode_block(&mut session.timer, SEGMENT_HEADER_LEN, session.log);

        if bdr.outcome.is_stream_fatal() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Stop;
        }
        if !bdr.outcome.is_accepted() {
            session.message(
                PFX,
                format!(
                    "ERROR: Segment header block not found or corrupt <{}>",
                    bdr.describe()
                ),
                Severity::Error,
            );
            return ScanControl::Continue;
        }

        let seg_header = &bdr.bytes;
        if seg_header[0] != 255 {
            session.message(
                PFX,
                format!(
                    "ERROR: Segment header block corrupt - first byte is not 255 <{}>",
                    bdr.describe()
                ),
                Severity::Error,
            );
            return ScanControl::Continue;
        }

        let first_addr = seg_header[1] as u32 | (seg_header[2] as u32) << 8;
        // The recorded value is one past the last address.
        let last_addr = (seg_header[3] as u32 | (seg_header[4] as u32) << 8).wrapping_sub(1);

        if first_addr == 0xFFFF {
            break;
        }

        if last_addr < first_addr {
            session.message(
                PFX,
                format!(
                    "ERROR: Segment header block corrupt - negative segment size <{}>",
                    bdr.describe()
                ),
                Severity::Error,
            );
            return ScanControl::Continue;
        }

        assembled.push((first_addr & 0xFF) as u8);
        assembled.push((first_addr >> 8) as u8);
        assembled.push((last_addr & 0xFF) as u8);
        assembled.push((last_addr >> 8) as u8);
        if session.config.verbose {
            session.message(
                PFX,
                format!(
                    "Segment header: {}-{} <{}>",
                    first_addr,
                    last_addr,
                    bdr.describe()
                ),
                Severity::Detail,
            );
        }

        // Segment data: identification byte, payload, checksum.
        let seg_len = (last_addr - first_addr + 1) as usize + 2;
        let bdr = decoder.decode_block(&mut session.timer, seg_len, session.log);

        if bdr.outcome.is_stream_fatal() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Stop;
        }
        if !bdr.outcome.is_accepted() {
            session.message(
                PFX,
                format!(
                    "ERROR: Segment data block not found or corrupt <{}>",
                    bdr.describe()
                ),
                Severity::Error,
            );
            return ScanControl::Continue;
        }

        let seg_data = &bdr.bytes;
        if seg_data[0] != 255 {
            session.message(
                PFX,
                format!(
                    "ERROR: Segment data block corrupt - first byte is not 255 <{}>",
                    bdr.describe()
                ),
                Severity::Error,
            );
            return ScanControl::Continue;
        }

        assembled.extend_from_slice(&seg_data[1..seg_data.len() - 1]);
        if session.config.verbose {
            session.message(
                PFX,
                format!("Segment data: {} bytes <{}>", seg_data.len(), bdr.describe()),
                Severity::Detail,
            );
        }
    }

    let sample = session
        .config
        .prepend_sample_number
        .then_some(first_file_sample);
    let name = output_name(&polished_name(&header_name), ".xex", sample);

    if session.save(PFX, &name, &assembled) {
        session.message(PFX, format!("SAVE: {name}"), Severity::Save);
    }

    ScanControl::Continue
}
