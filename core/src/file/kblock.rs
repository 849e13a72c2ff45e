//! Turbo 2000 kilobyte-blocks file decoder (Czechoslovakia).
//!
//! After the common 19-byte header the file is a chain of 1026-byte blocks:
//! type byte, 1024 payload bytes, checksum. Type 255 is a full kilobyte,
//! 250 terminates the file, 251-254 carry a partial tail whose length is
//! split between the type byte and the last payload byte.

use crate::dos2::looks_like_program_image;
use crate::filename::{output_name, polished_name};
use crate::logging::Severity;
use crate::pulse::SampleSource;

use super::{CzechBlockDecoder, DecodeSession, ScanControl};

const PFX: &str = "T2K KB";

const BLOCK_LEN: usize = 1026;

/// Decoded kilobyte-blocks header: only the 16-character name matters.
fn header_name(data: &[u8]) -> [u8; 16] {
    let mut name = [0u8; 16];
    name.copy_from_slice(&data[2..18]);
    name
}

pub fn decode_file<S: SampleSource>(session: &mut DecodeSession<'_, S>) -> ScanControl {
    let mut decoder = CzechBlockDecoder::new(session.timer.sample_rate(), &session.config, 256);

    let mut first_file_sample;
    let header_bdr = loop {
        first_file_sample = session.timer.position();
        let bdr = decoder.decode_block(
            &mut session.timer,
            super::turbo2000::HEADER_LEN,
            session.log,
        );

        if bdr.outcome.is_stream_fatal() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Stop;
        }
        if bdr.outcome.is_accepted() && bdr.bytes[0] == 0 {
            break bdr;
        }
    };

    let name = header_name(&header_bdr.bytes);
    session.message(
        PFX,
        format!(
            "HEADER: {} <{}>",
            String::from_utf8_lossy(&name),
            header_bdr.describe()
        ),
        header_bdr.outcome.severity(),
    );

    let mut assembled: Vec<u8> = Vec::new();
    let mut expect_eof = false;
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
        match data[0] {
            // Full kilobyte.
            255 => {
                if expect_eof {
                    session.message(
                        PFX,
                        format!(
                            "ERROR: Expected EOF block, but found FULL block {{{}}}",
                            bdr.position
                        ),
                        Severity::Error,
                    );
                    return ScanControl::Continue;
                }
                assembled.extend_from_slice(&data[1..1025]);
            }
            // End of file.
            250 => break,
            // Partial tail.
            251..=254 => {
                if expect_eof {
                    session.message(
                        PFX,
                        format!(
                            "ERROR: Expected EOF block, but found PARTIAL block {{{}}}",
                            bdr.position
                        ),
                        Severity::Error,
                    );
                    return ScanControl::Continue;
                }
                let len = ((data[0] - 251) as usize) << 8 | data[1024] as usize;
                assembled.extend_from_slice(&data[1..1 + len]);
                expect_eof = true;
            }
            _ => {
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
        ".kbdat"
    };
    let sample = session
        .config
        .prepend_sample_number
        .then_some(first_file_sample);
    let fname = output_name(&polished_name(&name[..10]), extension, sample);

    if session.save(PFX, &fname, &assembled) {
        session.message(PFX, format!("SAVE: {fname}"), Severity::Save);
    }

    ScanControl::Continue
}
