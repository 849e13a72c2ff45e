//! Super Turbo file decoder (Czechoslovakia).
//!
//! The Super Turbo layout mirrors Turbo 2000 with a longer header: 29 bytes,
//! magic byte 183, a 20-character name, and a data block whose first byte is
//! 237. Decoding always goes through the adaptive block decoder.

use crate::block::SuperTurboBlockDecoder;
use crate::dos2::RUN_VECTOR;
use crate::filename::{output_name, polished_name};
use crate::logging::Severity;
use crate::pulse::SampleSource;

use super::turbo2000::extension_for_type;
use super::{DecodeSession, ScanControl};

const PFX: &str = "ST";

pub(crate) const HEADER_LEN: usize = 29;

/// Decoded 29-byte Super Turbo header.
#[derive(Debug, Clone)]
pub(crate) struct SuperTurboHeader {
    pub file_type: u8,
    pub name: [u8; 20],
    pub load: u16,
    pub length: u16,
    pub run: u16,
}

impl SuperTurboHeader {
    pub fn parse(data: &[u8]) -> Self {
        let mut name = [0u8; 20];
        name.copy_from_slice(&data[2..22]);
        SuperTurboHeader {
            file_type: data[1],
            name,
            load: data[22] as u16 | (data[23] as u16) << 8,
            length: data[24] as u16 | (data[25] as u16) << 8,
            run: data[26] as u16 | (data[27] as u16) << 8,
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

    pub fn header_file_text(&self, raw: &[u8]) -> String {
        let mut s = format!(
            "cs.superturbo.header,{},{},{},{},{},",
            String::from_utf8_lossy(&self.name),
            self.file_type,
            self.load,
            self.length,
            self.run
        );
        for b in &raw[2..22] {
            s.push_str(&format!("{:02X} ", b));
        }
        s
    }
}

pub fn decode_file<S: SampleSource>(session: &mut DecodeSession<'_, S>) -> ScanControl {
    let mut decoder =
        SuperTurboBlockDecoder::new(session.timer.sample_rate(), &session.config, 256);

    let mut first_file_sample;
    let bdr = loop {
        first_file_sample = session.timer.position();
        let bdr = decoder.decode_block(&mut session.timer, HEADER_LEN, session.log);

        if bdr.outcome.is_stream_fatal() {
            session.message(PFX, bdr.describe(), bdr.outcome.severity());
            return ScanControl::Stop;
        }
        if bdr.outcome.is_accepted() && bdr.bytes[0] == 183 {
            break bdr;
        }
    };

    let header = SuperTurboHeader::parse(&bdr.bytes);
    session.message(
        PFX,
        format!("HEADER: {} <{}>", header.describe(), bdr.describe()),
        bdr.outcome.severity(),
    );

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
    if data[0] != 237 {
        session.message(
            PFX,
            "ERROR: First byte of data is not 237".to_string(),
            Severity::Error,
        );
        return ScanControl::Continue;
    }

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
