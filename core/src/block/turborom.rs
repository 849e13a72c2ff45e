//! Turbo ROM block decoder (Poland).
//!
//! Bits are packed LSB first. The header block carries its own checksum in
//! byte 0 (XOR of the remainder); data blocks fold to an expected value
//! stored in the header, supplied by the file decoder. An expectation of
//! `None` skips verification (monitor mode).

use super::detail;
use crate::checksum::{check_turbo_rom_header, check_xor_expected};
use crate::config::DecoderConfig;
use crate::logging::DecoderLog;
use crate::outcome::{BlockDecodeResult, Outcome};
use crate::pulse::{PulseTimer, SampleSource};
use crate::rescale;

const PFX: &str = "TurboROM";

const WIDE_HI: u32 = 32;
const WIDE_LO: u32 = 12;
const NARROW_LO: u32 = 2;
const MAX_PULSE: u32 = 50;

const MIN_PILOT_PULSES: u32 = 256;

pub struct TurboRomBlockDecoder {
    wide_hi: u32,
    wide_lo: u32,
    narrow_lo: u32,
    max_pulse: u32,
    is_header_decoder: bool,
    expected_checksum: Option<u8>,
    config: DecoderConfig,
    valid_bytes: usize,
}

impl TurboRomBlockDecoder {
    pub fn new(
        sample_rate: u32,
        config: &DecoderConfig,
        is_header_decoder: bool,
        expected_checksum: Option<u8>,
    ) -> Self {
        TurboRomBlockDecoder {
            wide_hi: rescale(WIDE_HI, sample_rate),
            wide_lo: rescale(WIDE_LO, sample_rate),
            narrow_lo: rescale(NARROW_LO, sample_rate),
            max_pulse: rescale(MAX_PULSE, sample_rate),
            is_header_decoder,
            expected_checksum,
            config: config.clone(),
            valid_bytes: 0,
        }
    }

    pub fn decode_block<S: SampleSource>(
        &mut self,
        timer: &mut PulseTimer<S>,
        len: usize,
        log: &mut dyn DecoderLog,
    ) -> BlockDecodeResult {
        let mut data = vec![0u8; len];
        self.valid_bytes = 0;

        if self.config.verbose {
            detail(
                log,
                PFX,
                format!(
                    "Pulse ranges: NL {},WL {}, WH {}, MP {}",
                    self.narrow_lo, self.wide_lo, self.wide_hi, self.max_pulse
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

            let checksum_right = if self.is_header_decoder {
                check_turbo_rom_header(&data)
            } else {
                match self.expected_checksum {
                    Some(expected) => check_xor_expected(&data, expected),
                    None => true,
                }
            };

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
        let r = timer.wait_for_rising_edge();
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
            // Pilot pulses are anything at wide width or above.
            if timer.counter() < self.wide_lo {
                return Outcome::UnexpectedPulseWidth;
            }
            pulses += 1;
            if pulses >= MIN_PILOT_PULSES {
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
            if timer.counter() >= self.wide_lo / 2 {
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
        let mut mask = 0x01u8;
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

            if mask == 0x80 {
                data[index] = current;
                self.valid_bytes += 1;
                index += 1;
                mask = 0x01;
                current = 0;
            } else {
                mask <<= 1;
            }
        }
        Outcome::Ok
    }
}
