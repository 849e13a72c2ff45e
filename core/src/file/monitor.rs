//! Turbo monitor: raw block dump for tape forensics.
//!
//! Decodes one giant block with the chosen system's block decoder and saves
//! whatever bytes came out, framing errors and all. The file name records
//! the start position, system, length and boundary bytes so dumps can be
//! correlated with the source recording.

use crate::filename::pad_zeros;
use crate::logging::Severity;
use crate::pulse::SampleSource;

use super::{DecodeSession, ScanControl, TapeFormat};

const PFX: &str = "MONITOR";

const MONITOR_BLOCK_LEN: usize = 65_536;

pub fn decode_file<S: SampleSource>(
    system: TapeFormat,
    session: &mut DecodeSession<'_, S>,
) -> ScanControl {
    let rate = session.timer.sample_rate();
    let config = session.config.clone();
    let start_position = session.timer.position();

    let bdr = match system {
        TapeFormat::LowerSilesianTurbo2000 => {
            let mut d = crate::block::Turbo2000BlockDecoder::new(rate, &config, 20);
            d.decode_block(&mut session.timer, MONITOR_BLOCK_LEN, session.log)
        }
        TapeFormat::HardTurbo | TapeFormat::KiloByteBlocks | TapeFormat::Turbo2000 => {
            if config.prefer_adaptive_speed_detection {
                let mut d = crate::block::SuperTurboBlockDecoder::new(rate, &config, 256);
                d.decode_block(&mut session.timer, MONITOR_BLOCK_LEN, session.log)
            } else {
                let mut d = crate::block::Turbo2000BlockDecoder::new(rate, &config, 256);
                d.decode_block(&mut session.timer, MONITOR_BLOCK_LEN, session.log)
            }
        }
        TapeFormat::TurboTape | TapeFormat::SuperTurbo | TapeFormat::UniversalTurbo => {
            let mut d = crate::block::SuperTurboBlockDecoder::new(rate, &config, 256);
            d.decode_block(&mut session.timer, MONITOR_BLOCK_LEN, session.log)
        }
        TapeFormat::KsoTurbo2000 => {
            let mut d = crate::block::KsoBlockDecoder::new(rate, &config);
            d.decode_block(&mut session.timer, MONITOR_BLOCK_LEN, session.log)
        }
        TapeFormat::TurboBlizzard => {
            let mut d = crate::block::BlizzardBlockDecoder::new(rate, &config, true, 256);
            d.decode_block(&mut session.timer, MONITOR_BLOCK_LEN, session.log)
        }
        TapeFormat::TurboRom => {
            let mut d = crate::block::TurboRomBlockDecoder::new(rate, &config, false, None);
            d.decode_block(&mut session.timer, MONITOR_BLOCK_LEN, session.log)
        }
        TapeFormat::AtariSuperTurbo => {
            let mut d = crate::block::AstBlockDecoder::new(rate, &config);
            d.decode_block(&mut session.timer, MONITOR_BLOCK_LEN, session.log)
        }
    };

    let valid = bdr.valid_bytes;
    session.message(
        PFX,
        format!("SUCCESS: Bytes monitored: {valid}"),
        Severity::Info,
    );
    session.message(
        PFX,
        format!("Reason to terminate monitoring: {}", bdr.describe()),
        Severity::Detail,
    );

    if valid > 0 {
        let data = &bdr.bytes[..valid];
        let (offset, count) = payload_portion(system, config.monitor_save_all_bytes, data);

        let name = format!(
            "{}_{}_{}_{}_{}_.tm",
            pad_zeros(start_position, 10),
            system.brief_name(),
            pad_zeros(data.len(), 5),
            pad_zeros(data[0], 3),
            pad_zeros(data[data.len() - 1], 3),
        );

        if session.save(PFX, &name, &data[offset..offset + count]) {
            session.message(
                PFX,
                format!("SAVE: {name} ({count} bytes)"),
                Severity::Save,
            );
        }
    }

    if bdr.outcome.is_stream_fatal() {
        session.message(PFX, bdr.describe(), bdr.outcome.severity());
        return ScanControl::Stop;
    }
    ScanControl::Continue
}

/// Trim framing bytes off the dump according to the system's block layout,
/// unless the raw dump was requested.
fn payload_portion(system: TapeFormat, all_bytes: bool, data: &[u8]) -> (usize, usize) {
    match system {
        TapeFormat::LowerSilesianTurbo2000
        | TapeFormat::Turbo2000
        | TapeFormat::SuperTurbo
        | TapeFormat::UniversalTurbo
        | TapeFormat::KiloByteBlocks
        | TapeFormat::HardTurbo => {
            if all_bytes || data.len() < 2 {
                (0, data.len())
            } else {
                (1, data.len() - 2)
            }
        }
        TapeFormat::TurboTape => {
            if all_bytes || data.len() < 17 {
                (0, data.len())
            } else {
                let last_offset = data[2] as usize + 256 * (data[3] & 0x7F) as usize;
                let mut final_len = last_offset.saturating_sub(16);
                if final_len > data.len() {
                    final_len = data.len() - 17;
                }
                (17, final_len.min(data.len() - 17))
            }
        }
        TapeFormat::KsoTurbo2000 | TapeFormat::TurboBlizzard => {
            if all_bytes || data.len() < 3 {
                (0, data.len())
            } else {
                let mut final_len = data[0] as usize + 256 * data[1] as usize;
                if final_len > data.len() {
                    final_len = data.len() - 3;
                }
                (2, final_len.min(data.len() - 2))
            }
        }
        TapeFormat::TurboRom | TapeFormat::AtariSuperTurbo => (0, data.len()),
    }
}
