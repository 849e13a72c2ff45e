//! Lower-Silesian Turbo 2000 block decoder (Poland).
//!
//! The plain variant is a Turbo 2000 derivative with slightly different
//! pulse widths. The FunnyCopy 1.0 protected variant additionally rotates
//! every payload byte left across the block ("mangling"), masks the checksum
//! to seven bits, and is validated structurally: after unmangling, the
//! payload must parse as a DOS 2 binary image. Partially decoded mangled
//! blocks are acceptable as long as the structure check passes.

use super::detail;
use crate::checksum::{check_funny_copy_block, check_xor_block};
use crate::config::DecoderConfig;
use crate::dos2::Dos2Binary;
use crate::logging::DecoderLog;
use crate::outcome::{BlockDecodeResult, Outcome};
use crate::pulse::{PulseTimer, SampleSource};
use crate::rescale;

const PFX: &str = "LST2000";

const MAX_PULSE: u32 = 50;
const PILOT_HI: u32 = 48;
const PILOT_LO: u32 = 32;
const WIDE_HI: u32 = 31;
const WIDE_LO: u32 = 19;
const NARROW_LO: u32 = 6;
const SYNC_HI: u32 = 24;
const SYNC_LO: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MangleMode {
    None,
    FunnyCopy10,
}

pub struct LowerSilesianBlockDecoder {
    max_pulse: u32,
    pilot_hi: u32,
    pilot_lo: u32,
    wide_hi: u32,
    wide_lo: u32,
    narrow_lo: u32,
    sync_hi: u32,
    sync_lo: u32,
    min_pilot_pulses: u32,
    mangle: MangleMode,
    config: DecoderConfig,
    valid_bytes: usize,
}

impl LowerSilesianBlockDecoder {
    pub fn new(
        sample_rate: u32,
        config: &DecoderConfig,
        min_pilot_pulses: u32,
        mangle: MangleMode,
    ) -> Self {
        LowerSilesianBlockDecoder {
            max_pulse: rescale(MAX_PULSE, sample_rate),
            pilot_hi: rescale(PILOT_HI, sample_rate),
            pilot_lo: rescale(PILOT_LO, sample_rate),
            wide_hi: rescale(WIDE_HI, sample_rate),
            wide_lo: rescale(WIDE_LO, sample_rate),
            narrow_lo: rescale(NARROW_LO, sample_rate),
            sync_hi: rescale(SYNC_HI, sample_rate),
            sync_lo: rescale(SYNC_LO, sample_rate),
            min_pilot_pulses,
            mangle,
            config: config.clone(),
            valid_bytes: 0,
        }
    }

    /// Decode one block. `expect_binary_header` only matters for the
    /// FunnyCopy 1.0 structural check: the first mangled block must carry the
    /// 255/255 binary header, continuation blocks must not.
    pub fn decode_block<S: SampleSource>(
        &mut self,
        timer: &mut PulseTimer<S>,
        len: usize,
        expect_binary_header: bool,
        log: &mut dyn DecoderLog,
    ) -> BlockDecodeResult {
        let mut data = vec![0u8; len];
        self.valid_bytes = 0;

        if self.config.verbose {
            detail(
                log,
                PFX,
                format!(
                    "Pulse ranges: SL {},SH {},NL {},WL {}, WH {},PL {}, PH {}, MP {}",
                    self.sync_lo,
                    self.sync_hi,
                    self.narrow_lo,
                    self.wide_lo,
                    self.wide_hi,
                    self.pilot_lo,
                    self.pilot_hi,
                    self.max_pulse
                ),
            );
        }

        loop {
            let r = self.wait_for_pilot(timer);
            if r.is_stream_fatal() {
                return BlockDecodeResult::new(Vec::new(), 0, r, timer.position());
            }
            if r != Outcome::Ok {
                continue;
            }
            if self.config.verbose {
                detail(log, PFX, format!("Pilot tone found {{{}}}", timer.position()));
            }

            let r = self.wait_for_sync(timer);
            if r.is_stream_fatal() {
                return BlockDecodeResult::new(Vec::new(), 0, r, timer.position());
            }
            if r != Outcome::Ok {
                continue;
            }
            if self.config.verbose {
                detail(log, PFX, format!("Sync pulse found {{{}}}", timer.position()));
            }
            log.impulse();

            let r = self.decode_data(timer, &mut data);

            let checksum_right;
            match self.mangle {
                MangleMode::FunnyCopy10 => {
                    if r.is_stream_fatal() {
                        return BlockDecodeResult::new(data, self.valid_bytes, r, timer.position());
                    }
                    if self.valid_bytes < 3 {
                        return BlockDecodeResult::new(
                            data,
                            self.valid_bytes,
                            Outcome::BlockTooShort,
                            timer.position(),
                        );
                    }

                    checksum_right = check_funny_copy_block(&data, self.valid_bytes);
                    self.unmangle(&mut data);

                    // Structural check: the unmangled payload must look like
                    // a DOS 2 binary image. Partial blocks pass as long as
                    // the structure holds.
                    let payload = &data[1..self.valid_bytes - 1];
                    if Dos2Binary::analyze(payload, expect_binary_header).is_err() {
                        if self.config.verbose {
                            detail(
                                log,
                                PFX,
                                format!(
                                    "Decoding of data failed. Bytes decoded: {} {{{}}}",
                                    self.valid_bytes,
                                    timer.position()
                                ),
                            );
                        }
                        return BlockDecodeResult::new(data, self.valid_bytes, r, timer.position());
                    }
                    // Structure is right, the block counts as decoded.
                }
                MangleMode::None => {
                    if r != Outcome::Ok {
                        if self.config.verbose {
                            detail(
                                log,
                                PFX,
                                format!(
                                    "Decoding of data failed. Bytes decoded: {} {{{}}}",
                                    self.valid_bytes,
                                    timer.position()
                                ),
                            );
                        }
                        return BlockDecodeResult::new(data, self.valid_bytes, r, timer.position());
                    }
                    if data.len() < 3 {
                        return BlockDecodeResult::new(
                            data,
                            self.valid_bytes,
                            Outcome::BlockTooShort,
                            timer.position(),
                        );
                    }
                    checksum_right = check_xor_block(&data);
                }
            }

            let outcome = if checksum_right {
                Outcome::Ok
            } else if self.config.tolerate_bad_checksum {
                Outcome::ChecksumWarning
            } else {
                Outcome::ChecksumBad
            };
            return BlockDecodeResult::new(data, self.valid_bytes, outcome, timer.position());
        }
    }

    fn wait_for_pilot<S: SampleSource>(&self, timer: &mut PulseTimer<S>) -> Outcome {
        timer.set_timeout(self.max_pulse);
        timer.set_counter(0);
        let r = timer.count_until_any_edge();
        if r != Outcome::Ok {
            return r;
        }

        let mut pulses = 0u32;
        loop {
            timer.set_counter(0);
            let r = timer.measure_pulse();
            if r != Outcome::Ok {
                return r;
            }
            if timer.counter() < self.pilot_lo {
                return Outcome::UnexpectedPulseWidth;
            }
            pulses += 1;
            if pulses >= self.min_pilot_pulses {
                return Outcome::Ok;
            }
        }
    }

    fn wait_for_sync<S: SampleSource>(&self, timer: &mut PulseTimer<S>) -> Outcome {
        loop {
            timer.set_counter(0);
            let r = timer.count_until_any_edge();
            if r != Outcome::Ok {
                return r;
            }
            if timer.counter() > self.sync_hi / 2 {
                continue;
            }
            return timer.count_until_any_edge();
        }
    }

    fn decode_data<S: SampleSource>(
        &mut self,
        timer: &mut PulseTimer<S>,
        data: &mut [u8],
    ) -> Outcome {
        let mut index = 0;
        let mut mask = 0x80u8;
        let mut current = 0u8;

        while index < data.len() {
            timer.set_counter(0);
            let r = timer.measure_pulse();
            if r != Outcome::Ok {
                return r;
            }
            let c = timer.counter();

            if (self.wide_lo..=self.wide_hi).contains(&c) {
                current |= mask;
            } else if !(self.narrow_lo..self.wide_lo).contains(&c) {
                return Outcome::AmbiguousBit;
            }

            if mask == 1 {
                data[index] = current;
                self.valid_bytes += 1;
                index += 1;
                mask = 0x80;
                current = 0;
            } else {
                mask >>= 1;
            }
        }
        Outcome::Ok
    }

    /// Rotate every payload byte one bit left, taking the carry from the
    /// following byte's high bit.
    fn unmangle(&self, data: &mut [u8]) {
        for i in 1..self.valid_bytes - 1 {
            let carry = data[i + 1] & 0x80 != 0;
            data[i] <<= 1;
            if carry {
                data[i] |= 0x01;
            }
        }
    }
}
