//! Turbo 2000 file decoder (Czechoslovakia).
//!
//! One 19-byte header block, then one data block sized from the header.
//! Depending on the recorded file type the payload is saved as-is, or
//! wrapped into a DOS 2 binary with load and run vectors synthesized from
//! header fields.

use crate::dos2::RUN_VECTOR;
use crate::filename::{output_name, polished_name};
use crate::logging::Severity;
use crate::pulse::SampleSource;

use super::{CzechBlockDecoder, DecodeSession, ScanControl};

const PFX: &str = "T2000";

pub(crate) const HEADER_LEN: usize = 19;

/// Decoded 19-byte Turbo 2000 header.
#[derive(Debug, Clone)]
pub(crate) struct Turbo2000Header {
    pub file_type: u8,
    pub name: [u8; 10],
    pub load: u16,
    pub length: u16,
    pub run: u16,
}

impl Turbo2000Header {
    pub fn parse(data: &[u8]) -> Self {
        let mut name = [0u8; 10];
        name.copy_from_slice(&data[2..12]);
        Turbo2000Header {
            file_type: data[1],
            name,
            load: data[12] as u16 | (data[13] as u16) << 8,
            length: data[14] as u16 | (data[15] as u16) << 8,
            run: data[16] as u16 | (data[17] as u16) << 8,
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "{}, LO:{}, LN:{}, RU:{}, TP:{}",
            String::from_utf8_lossy(&self.name),
            self.load,
            self.length,
            self.run,
            self.file_type
        )
    }

    /// Sidecar text representation of the raw header.
    pub fn header_file_text(&self, raw: &[u8]) -> String {
        let mut s = format!(
            "cs.turbo2000.header,{},{},{},{},{},",
            String::from_utf8_lossy(&self.name),
            self.file_type,
            self.load,
            self.length,
            self.run
        );
        for b in &raw[2..12] {
            s.push_str(&format!("{:02X} ", b));
        }
        s
    }
}

/// Extension by recorded file type: BASIC saves, native binaries, data.
pub(crate) fn extension_for_type(file_type: u8, always_binary: bool) -> &'static str {
    if always_binary {
        return ".xex";
    }
    match file_type {
        254 | 255 => ".bas",
        3 | 4 => ".xex",
        _ => ".dat",
    }
}

pub fn decode_file<S: SampleSource>(session: &mut DecodeSession<'_, S>) -> ScanControl {
    let mut decoder = CzechBlockDecoder::new(session.timer.sample_rate(), &session.config, 256);

    // Header search: anything that is not an accepted block with the Turbo
    // 2000 magic is silently retried.
    let mut first_file_sample;
    let bdr = loop {
        first_file_sample = session.timer.position();
        let bdr = decoder.decode_block(&mut session.timer, HEADER_LEN, session.log);

        if bdr.outcome.is_stream_fatal() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Stop;
        }
        if bdr.outcome.is_accepted() && bdr.bytes[0] == 0 {
            break bdr;
        }
    };

    let header = Turbo2000Header::parse(&bdr.bytes);
    session.message(
        PFX,
        format!("HEADER: {} <{}>", header.describe(), bdr.describe()),
        bdr.outcome.severity(),
    );

    // Data block: payload plus the leading identification byte and the
    // trailing checksum.
    let size = header.length as usize + 2;
    let data_bdr = decoder.decode_block(&mut session.timer, size, session.log);

    if data_bdr.outcome.is_stream_fatal() {
        session.message(PFX, data_bdr.describe(), data_bdr.outcome.severity());
        return ScanControl::Stop;
    }
    if data_bdr.outcome.is_physical_error() {
        session.message(PFX, data_bdr.describe(), data_bdr.outcome.severity());
        return ScanControl::Continue;
    }

    let data = &data_bdr.bytes;
    if data[0] != 255 {
        session.message(
            PFX,
            "ERROR: First byte of data is not 255".to_string(),
            Severity::Error,
        );
        return ScanControl::Continue;
    }

    // Assemble the output according to the file type.
    let save_as_binary = match header.file_type {
        3 => true,
        4 | 255 => false,
        _ => session.config.cs_turbo_always_save_as_binary,
    };

    let payload = &data[1..size - 1];
    let output = if save_as_binary {
        let mut out = Vec::with_capacity(payload.len() + 12);
        out.extend_from_slice(&[255, 255]);
        out.extend_from_slice(&header.load.to_le_bytes());
        let end = header.load.wrapping_add(header.length).wrapping_sub(1);
        out.extend_from_slice(&end.to_le_bytes());
        out.extend_from_slice(payload);
        out.extend_from_slice(&RUN_VECTOR.0.to_le_bytes());
        out.extend_from_slice(&RUN_VECTOR.1.to_le_bytes());
        out.extend_from_slice(&header.run.to_le_bytes());
        out
    } else {
        payload.to_vec()
    };

    let ext = extension_for_type(header.file_type, session.config.cs_turbo_always_save_as_binary);
    let sample = session
        .config
        .prepend_sample_number
        .then_some(first_file_sample);
    let name = output_name(&polished_name(&header.name), ext, sample);

    if session.save(PFX, &name, &output) {
        session.message(
            PFX,
            format!("SAVE: {} <{}>", name, data_bdr.describe()),
            Severity::Save,
        );
        if session.config.cs_turbo_save_header_to_extra_file {
            let text = header.header_file_text(&bdr.bytes);
            let sidecar = format!("{name}.theader");
            session.save(PFX, &sidecar, text.as_bytes());
        }
    }

    ScanControl::Continue
}
