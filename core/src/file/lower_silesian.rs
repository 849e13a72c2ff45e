//! Lower-Silesian Turbo 2000 file decoder (Poland).
//!
//! Three recorded conventions share the block format:
//!
//! * AutoTurbo — Turbo 2000 style header plus one data block.
//! * Unknown Exterminator — segment header/data pairs terminated by a 0/0
//!   header; the protected variant prefixes a dummy RUN segment header.
//! * FunnyCopy 1.0 protected — a loader file in plain blocks, one pre-data
//!   block, then the payload in mangled blocks reassembled by size.

use crate::block::{LowerSilesianBlockDecoder, MangleMode};
use crate::config::LowerSilesianFileFormat;
use crate::filename::{output_name, polished_name};
use crate::logging::Severity;
use crate::pulse::SampleSource;

use super::turbo2000::Turbo2000Header;
use super::{DecodeSession, ScanControl};

const HEADER_LEN: usize = 19;

pub fn decode_file<S: SampleSource>(session: &mut DecodeSession<'_, S>) -> ScanControl {
    let rate = session.timer.sample_rate();
    match session.config.lower_silesian_file_format {
        LowerSilesianFileFormat::AutoTurbo => {
            let mut decoder =
                LowerSilesianBlockDecoder::new(rate, &session.config, 256, MangleMode::None);
            decode_auto_turbo(session, &mut decoder)
        }
        LowerSilesianFileFormat::UnknownExterminatorProtected
        | LowerSilesianFileFormat::UnknownExterminatorUnprotected => {
            let mut decoder =
                LowerSilesianBlockDecoder::new(rate, &session.config, 24, MangleMode::None);
            decode_unknown_exterminator(session, &mut decoder)
        }
        LowerSilesianFileFormat::FunnyCopy10Protected => {
            let mut plain =
                LowerSilesianBlockDecoder::new(rate, &session.config, 256, MangleMode::None);
            let mut mangled =
                LowerSilesianBlockDecoder::new(rate, &session.config, 256, MangleMode::FunnyCopy10);
            decode_funny_copy(session, &mut plain, &mut mangled)
        }
    }
}

fn decode_auto_turbo<S: SampleSource>(
    session: &mut DecodeSession<'_, S>,
    decoder: &mut LowerSilesianBlockDecoder,
) -> ScanControl {
    const PFX: &str = "LST2000 AT";

    let mut first_file_sample;
    let header_bdr = loop {
        first_file_sample = session.timer.position();
        let bdr = decoder.decode_block(&mut session.timer, HEADER_LEN, false, session.log);

        if bdr.outcome.is_stream_fatal() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Stop;
        }
        if bdr.outcome.is_accepted() && bdr.bytes[0] == 0 {
            break bdr;
        }
    };

    let header = Turbo2000Header::parse(&header_bdr.bytes);
    session.message(
        PFX,
        format!("HEADER: {} <{}>", header.describe(), header_bdr.describe()),
        header_bdr.outcome.severity(),
    );

    let size = header.length as usize + 2;
    let bdr = decoder.decode_block(&mut session.timer, size, false, session.log);

    if bdr.outcome.is_stream_fatal() {
        session.message(PFX, bdr.describe(), bdr.outcome.severity());
        return ScanControl::Stop;
    }
    if bdr.outcome.is_physical_error() {
        session.message(PFX, bdr.describe(), bdr.outcome.severity());
        return ScanControl::Continue;
    }

    let data = &bdr.bytes;
    if data[0] != 255 {
        session.message(
            PFX,
            "ERROR: First byte of data is not 255".to_string(),
            Severity::Error,
        );
        return ScanControl::Continue;
    }

    let sample = session
        .config
        .prepend_sample_number
        .then_some(first_file_sample);
    let name = output_name(&polished_name(&header.name), ".xex", sample);

    if session.save(PFX, &name, &data[1..size - 1]) {
        session.message(
            PFX,
            format!("SAVE: {} <{}>", name, bdr.describe()),
            Severity::Save,
        );
    }

    ScanControl::Continue
}

fn decode_unknown_exterminator<S: SampleSource>(
    session: &mut DecodeSession<'_, S>,
    decoder: &mut LowerSilesianBlockDecoder,
) -> ScanControl {
    const PFX: &str = "LST2000 UE";

    let mut first_file_sample = session.timer.position();

    if session.config.lower_silesian_file_format
        == LowerSilesianFileFormat::UnknownExterminatorProtected
    {
        // The protection prefixes a dummy RUN segment header (0x02E0).
        loop {
            first_file_sample = session.timer.position();
            let bdr = decoder.decode_block(&mut session.timer, 3, false, session.log);

            if bdr.outcome.is_stream_fatal() {
                session.message(PFX, bdr.describe(), bdr.outcome.severity());
                return ScanControl::Stop;
            }
            if bdr.outcome.is_accepted() && bdr.bytes[0] == 0xE0 && bdr.bytes[1] == 0x02 {
                session.message(
                    PFX,
                    format!(
                        "Initial dummy RUN segment header found <{}>",
                        bdr.describe()
                    ),
                    bdr.outcome.severity(),
                );
                break;
            }
        }
    }

    let mut assembled = vec![255u8, 255];

    loop {
        let bdr = decoder.decode_block(&mut session.timer, 5, false, session.log);

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
        let first_addr = seg_header[0] as u16 | (seg_header[1] as u16) << 8;
        let last_addr = seg_header[2] as u16 | (seg_header[3] as u16) << 8;

        if first_addr == 0 && last_addr == 0 {
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

        assembled.extend_from_slice(&seg_header[..4]);
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

        // Segment data carries no identification byte, just a checksum.
        let seg_len = (last_addr - first_addr + 1) as usize + 1;
        let bdr = decoder.decode_block(&mut session.timer, seg_len, false, session.log);

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

        assembled.extend_from_slice(&bdr.bytes[..bdr.bytes.len() - 1]);
        if session.config.verbose {
            session.message(
                PFX,
                format!(
                    "Segment data: {} bytes <{}>",
                    bdr.bytes.len(),
                    bdr.describe()
                ),
                Severity::Detail,
            );
        }
    }

    // These recordings carry no name field at all; the sample number is
    // prefixed unconditionally to keep the output unique.
    let name = output_name("no_name", ".xex", Some(first_file_sample));

    if session.save(PFX, &name, &assembled) {
        session.message(
            PFX,
            format!("SAVE: {name}"),
            Severity::Save,
        );
    }

    ScanControl::Continue
}

fn decode_funny_copy<S: SampleSource>(
    session: &mut DecodeSession<'_, S>,
    plain: &mut LowerSilesianBlockDecoder,
    mangled: &mut LowerSilesianBlockDecoder,
) -> ScanControl {
    const PFX: &str = "LST2000 FC10P";

    // Loader header, Turbo 2000 layout.
    let mut first_file_sample;
    let header_bdr = loop {
        first_file_sample = session.timer.position();
        let bdr = plain.decode_block(&mut session.timer, HEADER_LEN, false, session.log);

        if bdr.outcome.is_stream_fatal() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Stop;
        }
        if bdr.outcome.is_accepted() && bdr.bytes[0] == 0 {
            break bdr;
        }
    };

    let header = Turbo2000Header::parse(&header_bdr.bytes);
    session.message(
        PFX,
        format!("HEADER: {} <{}>", header.describe(), header_bdr.describe()),
        header_bdr.outcome.severity(),
    );

    // Loader body.
    let size = header.length as usize + 2;
    let bdr = plain.decode_block(&mut session.timer, size, false, session.log);

    if bdr.outcome.is_stream_fatal() {
        session.message(PFX, bdr.describe(), bdr.outcome.severity());
        return ScanControl::Stop;
    }
    if bdr.outcome.is_physical_error() {
        session.message(PFX, bdr.describe(), bdr.outcome.severity());
        return ScanControl::Continue;
    }

    let loader = &bdr.bytes;
    if loader[0] != 255 {
        session.message(
            PFX,
            "ERROR: Special loader not decoded. First byte of data is not 255".to_string(),
            Severity::Error,
        );
        return ScanControl::Continue;
    }

    // The loader knows how much mangled data follows.
    let mangled_size =
        (loader[0x10] as usize | (loader[0x11] as usize) << 8).saturating_sub(80);
    session.message(
        PFX,
        format!(
            "Special loader decoded. Mangled data size: {} bytes. <{}>",
            mangled_size,
            bdr.describe()
        ),
        bdr.outcome.severity(),
    );

    // One fixed-size block of unknown purpose sits between loader and data.
    let bdr = plain.decode_block(&mut session.timer, 82, false, session.log);
    if bdr.outcome.is_stream_fatal() {
        session.message(PFX, bdr.describe(), bdr.outcome.severity());
        return ScanControl::Stop;
    }
    if bdr.outcome.is_physical_error() {
        session.message(PFX, bdr.describe(), bdr.outcome.severity());
        return ScanControl::Continue;
    }
    session.message(
        PFX,
        format!("Pre-data block decoded <{}>", bdr.describe()),
        bdr.outcome.severity(),
    );

    // Mangled payload blocks, accumulated by decoded size.
    let mut assembled: Vec<u8> = Vec::new();
    let mut total_decoded = 0usize;

    while total_decoded < mangled_size {
        let bdr = mangled.decode_block(
            &mut session.timer,
            mangled_size + 2,
            total_decoded == 0,
            session.log,
        );

        if bdr.outcome.is_stream_fatal() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Stop;
        }
        if bdr.outcome.is_physical_error() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Continue;
        }

        let valid = bdr.valid_bytes;
        total_decoded += valid - 2;
        session.message(
            PFX,
            format!(
                "Mangled data block decoded: {} bytes. <{}>",
                valid - 2,
                bdr.describe()
            ),
            bdr.outcome.severity(),
        );
        assembled.extend_from_slice(&bdr.bytes[1..valid - 1]);
    }

    let sample = session
        .config
        .prepend_sample_number
        .then_some(first_file_sample);
    let name = output_name(&polished_name(&header.name), ".xex", sample);

    if session.save(PFX, &name, &assembled) {
        session.message(PFX, format!("SAVE: {name}"), Severity::Save);
    }

    ScanControl::Continue
}
