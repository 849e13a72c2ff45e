//! Atari Super Turbo file decoder (Poland).
//!
//! One 256-byte header holds the segment count, per-segment start addresses
//! and lengths, the file name, and one expected checksum per segment. Each
//! segment is decoded as its own block and the output is assembled into a
//! DOS 2 binary image.

use crate::block::AstBlockDecoder;
use crate::filename::{internal_to_ascii, output_name, polished_name};
use crate::logging::Severity;
use crate::pulse::SampleSource;

use super::{DecodeSession, ScanControl};

const PFX: &str = "AST";

const HEADER_LEN: usize = 256;
/// The checksum table at offset 201 bounds the segment count.
const MAX_SEGMENTS: usize = 54;

struct AstHeader {
    segment_count: usize,
    name: [u8; 20],
}

impl AstHeader {
    fn parse(data: &[u8]) -> Self {
        let mut name = [0u8; 20];
        name.copy_from_slice(&data[180..200]);
        internal_to_ascii(&mut name);
        AstHeader {
            segment_count: data[0] as usize,
            name,
        }
    }

    fn start_address(&self, data: &[u8], seg: usize) -> u16 {
        data[2 + 4 * seg] as u16 | (data[3 + 4 * seg] as u16) << 8
    }

    fn length(&self, data: &[u8], seg: usize) -> u16 {
        data[4 + 4 * seg] as u16 | (data[5 + 4 * seg] as u16) << 8
    }

    fn checksum(&self, data: &[u8], seg: usize) -> u8 {
        data[201 + seg]
    }
}

pub fn decode_file<S: SampleSource>(session: &mut DecodeSession<'_, S>) -> ScanControl {
    let mut decoder = AstBlockDecoder::new(session.timer.sample_rate(), &session.config);

    let mut first_file_sample;
    let header_bdr = loop {
        first_file_sample = session.timer.position();
        // The header folds to zero.
        decoder.set_expected_checksum(0);
        let bdr = decoder.decode_block(&mut session.timer, HEADER_LEN, session.log);

        if bdr.outcome.is_stream_fatal() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Stop;
        }
        if bdr.outcome.is_accepted() {
            break bdr;
        }
    };

    let raw_header = header_bdr.bytes.clone();
    let header = AstHeader::parse(&raw_header);
    session.message(
        PFX,
        format!(
            "HEADER: {} BLKS:{} <{}>",
            String::from_utf8_lossy(&header.name),
            header.segment_count,
            header_bdr.describe()
        ),
        header_bdr.outcome.severity(),
    );

    if header.segment_count == 0 || header.segment_count > MAX_SEGMENTS {
        session.message(
            PFX,
            format!("ERROR: Implausible segment count {}", header.segment_count),
            Severity::Error,
        );
        return ScanControl::Continue;
    }

    let mut segment_data: Vec<Vec<u8>> = Vec::with_capacity(header.segment_count);

    for seg in 0..header.segment_count {
        decoder.set_expected_checksum(header.checksum(&raw_header, seg));
        let len = header.length(&raw_header, seg) as usize;
        let bdr = decoder.decode_block(&mut session.timer, len, session.log);

        if bdr.outcome.is_stream_fatal() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Stop;
        }
        if bdr.outcome.is_physical_error() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Continue;
        }

        segment_data.push(bdr.bytes);
    }

    // Assemble the DOS 2 binary: one address-tagged segment per block.
    let mut output = vec![255u8, 255];
    for (seg, data) in segment_data.iter().enumerate() {
        let start = header.start_address(&raw_header, seg);
        let length = header.length(&raw_header, seg);
        let end = start.wrapping_add(length).wrapping_sub(1);
        output.extend_from_slice(&start.to_le_bytes());
        output.extend_from_slice(&end.to_le_bytes());
        output.extend_from_slice(data);
    }

    let sample = session
        .config
        .prepend_sample_number
        .then_some(first_file_sample);
    let name = output_name(&polished_name(&header.name), ".xex", sample);

    if session.save(PFX, &name, &output) {
        session.message(PFX, format!("SAVE: {name}"), Severity::Save);
    }

    ScanControl::Continue
}
