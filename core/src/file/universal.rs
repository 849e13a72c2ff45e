//! Unified Turbo 2000 / Super Turbo file decoder (Czechoslovakia).
//!
//! Uses the adaptive block decoder's system determination: the header block
//! sizes itself as 19 (Turbo 2000) or 29 (Super Turbo) bytes and the result
//! carries which system was seen. Everything downstream follows that
//! verdict.

use crate::block::SuperTurboBlockDecoder;
use crate::dos2::RUN_VECTOR;
use crate::filename::{output_name, polished_name};
use crate::logging::Severity;
use crate::outcome::DeterminedTurbo;
use crate::pulse::SampleSource;

use super::superturbo::SuperTurboHeader;
use super::turbo2000::{extension_for_type, Turbo2000Header};
use super::{DecodeSession, ScanControl};

const PFX: &str = "UniT";

pub fn decode_file<S: SampleSource>(session: &mut DecodeSession<'_, S>) -> ScanControl {
    let rate = session.timer.sample_rate();
    let mut header_decoder =
        SuperTurboBlockDecoder::with_determination(rate, &session.config, true, 1_024);
    let mut data_decoder = SuperTurboBlockDecoder::new(rate, &session.config, 1_024);

    let mut first_file_sample;
    let (header_bdr, system) = loop {
        first_file_sample = session.timer.position();
        let bdr = header_decoder.decode_block(&mut session.timer, 0, session.log);

        if bdr.outcome.is_stream_fatal() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Stop;
        }
        if bdr.outcome.is_accepted() && (bdr.valid_bytes == 19 || bdr.valid_bytes == 29) {
            let system = bdr.aux.expect("adaptive decoder reports the system");
            match system {
                DeterminedTurbo::SuperTurbo if bdr.bytes[0] == 183 => break (bdr, system),
                DeterminedTurbo::Turbo2000 if bdr.bytes[0] == 0 => break (bdr, system),
                _ => {}
            }
        }
    };

    // Field layout depends on the detected system.
    let (describe, name, file_type, load, length, run) = match system {
        DeterminedTurbo::SuperTurbo => {
            let h = SuperTurboHeader::parse(&header_bdr.bytes);
            (
                h.describe(),
                h.name.to_vec(),
                h.file_type,
                h.load,
                h.length,
                h.run,
            )
        }
        DeterminedTurbo::Turbo2000 => {
            let h = Turbo2000Header::parse(&header_bdr.bytes);
            (
                h.describe(),
                h.name.to_vec(),
                h.file_type,
                h.load,
                h.length,
                h.run,
            )
        }
    };

    session.message(
        PFX,
        format!("HEADER: {} <{}>", describe, header_bdr.describe()),
        header_bdr.outcome.severity(),
    );

    let size = length as usize;
    let bdr = data_decoder.decode_block(&mut session.timer, size + 2, session.log);

    if bdr.outcome.is_stream_fatal() {
        session.message(PFX, bdr.describe(), bdr.outcome.severity());
        return ScanControl::Stop;
    }
    if bdr.outcome.is_physical_error() {
        session.message(PFX, bdr.describe(), bdr.outcome.severity());
        return ScanControl::Continue;
    }

    let data = &bdr.bytes;
    let expected_first = match system {
        DeterminedTurbo::SuperTurbo => 237,
        DeterminedTurbo::Turbo2000 => 255,
    };
    if data[0] != expected_first {
        session.message(
            PFX,
            "ERROR: First byte of data is not 237 or 255".to_string(),
            Severity::Error,
        );
        return ScanControl::Continue;
    }

    let save_as_binary = match file_type {
        3 => true,
        4 | 255 => false,
        _ => session.config.cs_turbo_always_save_as_binary,
    };

    let payload = &data[1..1 + size];
    let output = if save_as_binary {
        let mut out = Vec::with_capacity(payload.len() + 12);
        out.extend_from_slice(&[255, 255]);
        out.extend_from_slice(&load.to_le_bytes());
        let end = load.wrapping_add(length).wrapping_sub(1);
        out.extend_from_slice(&end.to_le_bytes());
        out.extend_from_slice(payload);
        out.extend_from_slice(&RUN_VECTOR.0.to_le_bytes());
        out.extend_from_slice(&RUN_VECTOR.1.to_le_bytes());
        out.extend_from_slice(&run.to_le_bytes());
        out
    } else {
        payload.to_vec()
    };

    let ext = extension_for_type(file_type, session.config.cs_turbo_always_save_as_binary);
    let sample = session
        .config
        .prepend_sample_number
        .then_some(first_file_sample);
    let fname = output_name(&polished_name(&name), ext, sample);

    if session.save(PFX, &fname, &output) {
        session.message(
            PFX,
            format!("SAVE: {} <{}>", fname, bdr.describe()),
            Severity::Save,
        );
    }

    ScanControl::Continue
}
