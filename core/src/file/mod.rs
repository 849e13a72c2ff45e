//! Per-format file decoders and scan orchestration.
//!
//! A file decoder sequences block decodes (header, data segments, end
//! markers) into one output file. Outcomes are classified uniformly: a
//! stream-level outcome stops the whole scan; a physical block error aborts
//! only the current file attempt and scanning resumes with a fresh pilot
//! search from the current position.

pub mod ast;
pub mod blizzard;
pub mod hardturbo;
pub mod kblock;
pub mod kso;
pub mod lower_silesian;
pub mod monitor;
pub mod superturbo;
pub mod turbo2000;
pub mod turborom;
pub mod turbotape;
pub mod universal;

use crate::block::{SuperTurboBlockDecoder, Turbo2000BlockDecoder};
use crate::config::DecoderConfig;
use crate::logging::{DecoderLog, DecoderMessage, Severity};
use crate::outcome::BlockDecodeResult;
use crate::pulse::{PulseTimer, SampleSource};
use crate::writer::FileWriter;
use std::path::PathBuf;

/// What the scanning loop should do after a file decode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanControl {
    /// Keep scanning for the next file.
    Continue,
    /// Stream-level outcome; stop the scan.
    Stop,
}

/// All supported tape formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeFormat {
    Turbo2000,
    KiloByteBlocks,
    SuperTurbo,
    TurboTape,
    KsoTurbo2000,
    TurboBlizzard,
    TurboRom,
    AtariSuperTurbo,
    HardTurbo,
    LowerSilesianTurbo2000,
    UniversalTurbo,
}

impl TapeFormat {
    pub const ALL: [TapeFormat; 11] = [
        TapeFormat::Turbo2000,
        TapeFormat::KiloByteBlocks,
        TapeFormat::SuperTurbo,
        TapeFormat::TurboTape,
        TapeFormat::KsoTurbo2000,
        TapeFormat::TurboBlizzard,
        TapeFormat::TurboRom,
        TapeFormat::AtariSuperTurbo,
        TapeFormat::HardTurbo,
        TapeFormat::LowerSilesianTurbo2000,
        TapeFormat::UniversalTurbo,
    ];

    pub fn brief_name(&self) -> &'static str {
        match self {
            TapeFormat::Turbo2000 => "t2000",
            TapeFormat::KiloByteBlocks => "t2kkb",
            TapeFormat::SuperTurbo => "st",
            TapeFormat::TurboTape => "ttape",
            TapeFormat::KsoTurbo2000 => "ksot2000",
            TapeFormat::TurboBlizzard => "blizzard",
            TapeFormat::TurboRom => "turborom",
            TapeFormat::AtariSuperTurbo => "ast",
            TapeFormat::HardTurbo => "hard",
            TapeFormat::LowerSilesianTurbo2000 => "lst2000",
            TapeFormat::UniversalTurbo => "unit",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TapeFormat::Turbo2000 => "Turbo 2000",
            TapeFormat::KiloByteBlocks => "Turbo 2000 - Kilobyte Blocks",
            TapeFormat::SuperTurbo => "Super Turbo",
            TapeFormat::TurboTape => "Turbo Tape",
            TapeFormat::KsoTurbo2000 => "KSO Turbo 2000",
            TapeFormat::TurboBlizzard => "Turbo Blizzard",
            TapeFormat::TurboRom => "Turbo ROM",
            TapeFormat::AtariSuperTurbo => "Atari Super Turbo",
            TapeFormat::HardTurbo => "Hard Turbo",
            TapeFormat::LowerSilesianTurbo2000 => "Lower Silesian Turbo 2000",
            TapeFormat::UniversalTurbo => "Turbo 2000 / Super Turbo (automatic)",
        }
    }

    pub fn from_brief_name(name: &str) -> Option<TapeFormat> {
        TapeFormat::ALL
            .into_iter()
            .find(|f| f.brief_name() == name)
    }
}

/// One decode run: the pulse timer over the sample source, the configuration,
/// and the output/log collaborators. Constructed once per run and passed by
/// reference into every decoder call.
pub struct DecodeSession<'a, S: SampleSource> {
    pub timer: PulseTimer<S>,
    pub config: DecoderConfig,
    pub out_dir: PathBuf,
    pub log: &'a mut dyn DecoderLog,
    pub writer: &'a mut dyn FileWriter,
}

impl<'a, S: SampleSource> DecodeSession<'a, S> {
    pub fn new(
        timer: PulseTimer<S>,
        config: DecoderConfig,
        out_dir: PathBuf,
        log: &'a mut dyn DecoderLog,
        writer: &'a mut dyn FileWriter,
    ) -> Self {
        log::debug!(
            "decode session: {} Hz source, output directory {}",
            timer.sample_rate(),
            out_dir.display()
        );
        DecodeSession {
            timer,
            config,
            out_dir,
            log,
            writer,
        }
    }

    pub(crate) fn message(&mut self, prefix: &'static str, text: String, severity: Severity) {
        self.log
            .add_message(DecoderMessage::new(prefix, text, severity));
    }

    /// Write one output file, logging the result. I/O failure is an error
    /// for this file only; the scan continues.
    pub(crate) fn save(&mut self, prefix: &'static str, name: &str, data: &[u8]) -> bool {
        match self.writer.write_file(&self.out_dir, name, data) {
            Ok(()) => true,
            Err(e) => {
                self.message(prefix, format!("ERROR: {e}"), Severity::Error);
                false
            }
        }
    }
}

/// Czech Turbo 2000 formats optionally run through the adaptive Super Turbo
/// block decoder when off-nominal speeds are expected.
pub(crate) enum CzechBlockDecoder {
    Classic(Turbo2000BlockDecoder),
    Adaptive(SuperTurboBlockDecoder),
}

impl CzechBlockDecoder {
    pub(crate) fn new(sample_rate: u32, config: &DecoderConfig, min_pilot_pulses: u32) -> Self {
        if config.prefer_adaptive_speed_detection {
            CzechBlockDecoder::Adaptive(SuperTurboBlockDecoder::new(
                sample_rate,
                config,
                min_pilot_pulses,
            ))
        } else {
            CzechBlockDecoder::Classic(Turbo2000BlockDecoder::new(
                sample_rate,
                config,
                min_pilot_pulses,
            ))
        }
    }

    pub(crate) fn decode_block<S: SampleSource>(
        &mut self,
        timer: &mut PulseTimer<S>,
        len: usize,
        log: &mut dyn DecoderLog,
    ) -> BlockDecodeResult {
        match self {
            CzechBlockDecoder::Classic(d) => d.decode_block(timer, len, log),
            CzechBlockDecoder::Adaptive(d) => d.decode_block(timer, len, log),
        }
    }
}

/// Decode one file of the given format. Call repeatedly to scan a stream.
pub fn decode_file<S: SampleSource>(
    format: TapeFormat,
    session: &mut DecodeSession<'_, S>,
) -> ScanControl {
    match format {
        TapeFormat::Turbo2000 => turbo2000::decode_file(session),
        TapeFormat::SuperTurbo => superturbo::decode_file(session),
        TapeFormat::KiloByteBlocks => kblock::decode_file(session),
        TapeFormat::TurboTape => turbotape::decode_file(session),
        TapeFormat::KsoTurbo2000 => kso::decode_file(session),
        TapeFormat::TurboBlizzard => blizzard::decode_file(session),
        TapeFormat::TurboRom => turborom::decode_file(session),
        TapeFormat::AtariSuperTurbo => ast::decode_file(session),
        TapeFormat::HardTurbo => hardturbo::decode_file(session),
        TapeFormat::LowerSilesianTurbo2000 => lower_silesian::decode_file(session),
        TapeFormat::UniversalTurbo => universal::decode_file(session),
    }
}

/// Scan the stream end to end, decoding every file found.
pub fn scan<S: SampleSource>(format: TapeFormat, session: &mut DecodeSession<'_, S>) {
    while decode_file(format, session) == ScanControl::Continue {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brief_names_round_trip() {
        for f in TapeFormat::ALL {
            assert_eq!(TapeFormat::from_brief_name(f.brief_name()), Some(f));
        }
        assert_eq!(TapeFormat::from_brief_name("nosuch"), None);
    }
}
