//! Turbo ROM file decoder (Poland).
//!
//! Two recorded layouts share the block format: binary programs use a
//! 41-byte header (terminated by an RTS opcode) and are wrapped into a DOS 2
//! binary with INIT and RUN vectors; BASIC programs use a 78-byte header
//! whose trailing pointer table is rebased before being written in front of
//! the payload. Header fields are validated structurally before a file
//! attempt is accepted.

use crate::block::TurboRomBlockDecoder;
use crate::config::TurboRomFileFormat;
use crate::dos2::{INIT_VECTOR, RUN_VECTOR};
use crate::filename::{internal_to_ascii, output_name, polished_name};
use crate::logging::Severity;
use crate::outcome::BlockDecodeResult;
use crate::pulse::SampleSource;

use super::{DecodeSession, ScanControl};

const PFX: &str = "TurboROM";

const BINARY_HEADER_LEN: usize = 41;
const BASIC_HEADER_LEN: usize = 78;

/// Fields shared by both Turbo ROM header layouts.
#[derive(Debug, Clone)]
struct TurboRomHeader {
    size: u16,
    run: u16,
    init: u16,
    load: u16,
    program_type: u8,
    init_flag: u8,
    checksum: u8,
    name: [u8; 20],
}

impl TurboRomHeader {
    fn parse(data: &[u8]) -> Self {
        let mut name = [0u8; 20];
        name.copy_from_slice(&data[15..35]);
        internal_to_ascii(&mut name);
        TurboRomHeader {
            size: data[12] as u16 | (data[13] as u16) << 8,
            run: data[6] as u16 | (data[7] as u16) << 8,
            init: data[8] as u16 | (data[9] as u16) << 8,
            load: data[10] as u16 | (data[11] as u16) << 8,
            program_type: data[35],
            init_flag: data[36],
            checksum: data[5],
            name,
        }
    }

    /// INIT address, when the header declares one.
    fn init_address(&self) -> Option<u16> {
        (self.init_flag == 0).then_some(self.init)
    }
}

fn check_header_binary(data: &[u8]) -> Option<&'static str> {
    if data[3] != 40 || data[4] != 0 {
        Some("ERROR:Malformed header-Length bytes not 40, 0")
    } else if data[14] != 0 {
        Some("ERROR:Malformed header-Padding byte at offset 14 not zero")
    } else if data[35] != 1 {
        Some("ERROR:Malformed header-Program type byte not 1")
    } else if data[37] != 0 || data[38] != 0 || data[39] != 0 {
        Some("ERROR:Malformed header-Padding bytes at offset 37 not zero")
    } else if data[40] != 96 {
        Some("ERROR:Malformed header-Last byte is not RTS opcode")
    } else {
        None
    }
}

fn check_header_basic(data: &[u8]) -> Option<&'static str> {
    if data[3] != 77 || data[4] != 0 {
        Some("ERROR:Malformed header-Length bytes not 77, 0")
    } else if data[8] != 0 || data[9] != 0 {
        Some("ERROR:Malformed header-INIT address not 0")
    } else if data[14] != 0 {
        Some("ERROR:Malformed header-Padding byte at offset 14 not zero")
    } else if data[35] != 0 {
        Some("ERROR:Malformed header-Program type flag not 0")
    } else if data[36] != 1 {
        Some("ERROR:Malformed header-INIT flag not set to 1")
    } else if data[37] != 0 || data[38] != 0 || data[39] != 0 {
        Some("ERROR:Malformed header-Bytes at offsets 37-39 not zeros")
    } else {
        None
    }
}

pub fn decode_file<S: SampleSource>(session: &mut DecodeSession<'_, S>) -> ScanControl {
    match session.config.turbo_rom_file_format {
        TurboRomFileFormat::Binary => decode_binary(session),
        TurboRomFileFormat::Basic => decode_basic(session),
    }
}

/// Header search shared by both layouts: retry until an accepted block
/// passes the structural check.
fn find_header<S: SampleSource>(
    session: &mut DecodeSession<'_, S>,
    len: usize,
    check: fn(&[u8]) -> Option<&'static str>,
    first_file_sample: &mut u64,
) -> Option<BlockDecodeResult> {
    let mut header_decoder =
        TurboRomBlockDecoder::new(session.timer.sample_rate(), &session.config, true, None);

    loop {
        *first_file_sample = session.timer.position();
        let bdr = header_decoder.decode_block(&mut session.timer, len, session.log);

        if bdr.outcome.is_stream_fatal() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return None;
        }
        if bdr.outcome.is_accepted() {
            match check(&bdr.bytes) {
                None => return Some(bdr),
                Some(msg) => session.message(PFX, msg.to_string(), Severity::Error),
            }
        }
    }
}

fn decode_binary<S: SampleSource>(session: &mut DecodeSession<'_, S>) -> ScanControl {
    let mut first_file_sample = 0u64;
    let header_bdr = match find_header(
        session,
        BINARY_HEADER_LEN,
        check_header_binary,
        &mut first_file_sample,
    ) {
        Some(bdr) => bdr,
        None => return ScanControl::Stop,
    };

    let header = TurboRomHeader::parse(&header_bdr.bytes);
    let mut describe = format!(
        "{} LO:{} LN:{} RU:{}",
        String::from_utf8_lossy(&header.name),
        header.load,
        header.size,
        header.run
    );
    if let Some(init) = header.init_address() {
        describe.push_str(&format!(" IN:{init}"));
    }
    session.message(
        PFX,
        format!("HEADER: {} <{}>", describe, header_bdr.describe()),
        header_bdr.outcome.severity(),
    );

    let mut data_decoder = TurboRomBlockDecoder::new(
        session.timer.sample_rate(),
        &session.config,
        false,
        Some(header.checksum),
    );
    let bdr = data_decoder.decode_block(&mut session.timer, header.size as usize, session.log);

    if bdr.outcome.is_stream_fatal() {
        session.message(PFX, bdr.describe(), bdr.outcome.severity());
        return ScanControl::Stop;
    }
    if bdr.outcome.is_physical_error() {
        session.message(PFX, bdr.describe(), bdr.outcome.severity());
        return ScanControl::Continue;
    }

    let data = &bdr.bytes;
    let output = if header.program_type != 1 {
        data.clone()
    } else {
        let mut out = Vec::with_capacity(data.len() + 18);
        out.extend_from_slice(&[255, 255]);
        out.extend_from_slice(&header.load.to_le_bytes());
        let end = header.load.wrapping_add(header.size).wrapping_sub(1);
        out.extend_from_slice(&end.to_le_bytes());
        out.extend_from_slice(data);
        if let Some(init) = header.init_address() {
            out.extend_from_slice(&INIT_VECTOR.0.to_le_bytes());
            out.extend_from_slice(&INIT_VECTOR.1.to_le_bytes());
            out.extend_from_slice(&init.to_le_bytes());
        }
        out.extend_from_slice(&RUN_VECTOR.0.to_le_bytes());
        out.extend_from_slice(&RUN_VECTOR.1.to_le_bytes());
        out.extend_from_slice(&header.run.to_le_bytes());
        out
    };

    let sample = session
        .config
        .prepend_sample_number
        .then_some(first_file_sample);
    let name = output_name(&polished_name(&header.name), ".xex", sample);

    if session.save(PFX, &name, &output) {
        session.message(
            PFX,
            format!("SAVE: {} <{}>", name, bdr.describe()),
            Severity::Save,
        );
    }

    ScanControl::Continue
}

fn decode_basic<S: SampleSource>(session: &mut DecodeSession<'_, S>) -> ScanControl {
    let mut first_file_sample = 0u64;
    let header_bdr = match find_header(
        session,
        BASIC_HEADER_LEN,
        check_header_basic,
        &mut first_file_sample,
    ) {
        Some(bdr) => bdr,
        None => return ScanControl::Stop,
    };

    let header = TurboRomHeader::parse(&header_bdr.bytes);
    session.message(
        PFX,
        format!(
            "HEADER: {} LN:{} <{}>",
            String::from_utf8_lossy(&header.name),
            header.size,
            header_bdr.describe()
        ),
        header_bdr.outcome.severity(),
    );

    let mut data_decoder = TurboRomBlockDecoder::new(
        session.timer.sample_rate(),
        &session.config,
        false,
        Some(header.checksum),
    );
    let bdr = data_decoder.decode_block(&mut session.timer, header.size as usize, session.log);

    if bdr.outcome.is_stream_fatal() {
        session.message(PFX, bdr.describe(), bdr.outcome.severity());
        return ScanControl::Stop;
    }
    if bdr.outcome.is_physical_error() {
        session.message(PFX, bdr.describe(), bdr.outcome.severity());
        return ScanControl::Continue;
    }

    // The header carries seven BASIC memory pointers; the saved file wants
    // them rebased to zero.
    let raw = &header_bdr.bytes;
    let base = raw[60] as u16 | (raw[61] as u16) << 8;
    let mut output = Vec::with_capacity(14 + bdr.bytes.len());
    for i in 0..7 {
        let addr = raw[60 + 2 * i] as u16 | (raw[60 + 2 * i + 1] as u16) << 8;
        let rebased = addr.wrapping_sub(base);
        output.extend_from_slice(&rebased.to_le_bytes());
    }
    output.extend_from_slice(&bdr.bytes);

    let sample = session
        .config
        .prepend_sample_number
        .then_some(first_file_sample);
    let name = output_name(&polished_name(&header.name), ".bas", sample);

    if session.save(PFX, &name, &output) {
        session.message(
            PFX,
            format!("SAVE: {} <{}>", name, bdr.describe()),
            Severity::Save,
        );
    }

    ScanControl::Continue
}
