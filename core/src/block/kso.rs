//! KSO Turbo 2000 block decoder (Poland).
//!
//! Bits are encoded in the falling-to-rising interval, so only the low half
//! of each wave is measured and all boundaries are compared halved. The sync
//! pulse doubles as the first data bit: the first narrow-or-wide interval
//! after the pilot seeds bit 7 before the main loop starts.

use super::detail;
use crate::checksum::check_additive_block;
use crate::config::DecoderConfig;
use crate::logging::DecoderLog;
use crate::outcome::{BlockDecodeResult, Outcome};
use crate::pulse::{PulseTimer, SampleSource};
use crate::rescale;

const PFX: &str = "KSO";

const PILOT_LO: u32 = 34;
const WIDE_HI: u32 = 28;
const WIDE_LO: u32 = 17;
const NARROW_LO: u32 = 5;
const MAX_PULSE: u32 = 56;

const MIN_PILOT_PULSES: u32 = 256;

pub struct KsoBlockDecoder {
    pilot_lo: u32,
    wide_hi: u32,
    wide_lo: u32,
    narrow_lo: u32,
    max_pulse: u32,
    config: DecoderConfig,
    valid_bytes: usize,
    valid_bits: usize,
    first_block_bit: u8,
}

impl KsoBlockDecoder {
    pub fn new(sample_rate: u32, config: &DecoderConfig) -> Self {
        KsoBlockDecoder {
            pilot_lo: rescale(PILOT_LO, sample_rate),
            wide_hi: rescale(WIDE_HI, sample_rate),
            wide_lo: rescale(WIDE_LO, sample_rate),
            narrow_lo: rescale(NARROW_LO, sample_rate),
            max_pulse: rescale(MAX_PULSE, sample_rate),
            config: config.clone(),
            valid_bytes: 0,
            valid_bits: 0,
            first_block_bit: 0,
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

            let r = self.wait_for_first_bit(timer);
            if r.is_stream_fatal() {
                return BlockDecodeResult::new(Vec::new(), 0, r, timer.position());
            }
            if r != Outcome::Ok {
                continue;
            }
            if self.config.verbose {
                detail(
                    log,
                    PFX,
                    format!("First data bit found {{{}}}", timer.position()),
                );
            }
            log.impulse();

            let r = self.decode_data(timer, &mut data);

            if r != Outcome::Ok {
                if self.config.verbose {
                    detail(
                        log,
                        PFX,
                        format!(
                            "Decoding of data failed. Bytes decoded: {}/{} {{{}}}",
                            self.valid_bytes,
                            self.valid_bits,
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

            if self.config.verbose {
                detail(
                    log,
                    PFX,
                    format!(
                        "Block decoded: {}/{} {{{}}}",
                        self.valid_bytes,
                        self.valid_bits,
                        timer.position()
                    ),
                );
            }

            let outcome = if check_additive_block(&data) {
                Outcome::Ok
            } else if self.config.tolerate_bad_checksum {
                Outcome::ChecksumWarning
            } else {
                Outcome::ChecksumBad
            };
            return BlockDecodeResult::new(data, self.valid_bytes, outcome, timer.position());
        }
    }

    /// Measure low halves only: resync to a falling edge, count to the next
    /// rising edge.
    fn low_half<S: SampleSource>(&self, timer: &mut PulseTimer<S>) -> Outcome {
        let r = timer.wait_for_falling_edge();
        if r != Outcome::Ok {
            return r;
        }
        timer.set_counter(0);
        timer.count_until_rising_edge()
    }

    fn wait_for_pilot<S: SampleSource>(&self, timer: &mut PulseTimer<S>) -> Outcome {
        timer.set_timeout(self.max_pulse / 2);

        let mut pulses = 0u32;
        loop {
            let r = self.low_half(timer);
            if r != Outcome::Ok {
                return r;
            }
            if timer.counter() < self.pilot_lo / 2 {
                return Outcome::UnexpectedPulseWidth;
            }
            pulses += 1;
            if pulses >= MIN_PILOT_PULSES {
                return Outcome::Ok;
            }
        }
    }

    fn wait_for_first_bit<S: SampleSource>(&mut self, timer: &mut PulseTimer<S>) -> Outcome {
        self.valid_bits = 0;
        timer.set_timeout(self.max_pulse / 2);

        loop {
            let r = self.low_half(timer);
            if r != Outcome::Ok {
                return r;
            }
            let c = timer.counter();

            // Still pilot tone.
            if c > self.wide_hi / 2 {
                continue;
            }
            self.first_block_bit = if c < self.wide_lo / 2 { 0 } else { 0x80 };
            self.valid_bits += 1;
            return Outcome::Ok;
        }
    }

    fn decode_data<S: SampleSource>(
        &mut self,
        timer: &mut PulseTimer<S>,
        data: &mut [u8],
    ) -> Outcome {
        let mut index = 0;
        // Bit 7 was already consumed together with the sync pulse.
        let mut mask = 0x40u8;
        let mut current = self.first_block_bit;

        timer.set_timeout(self.max_pulse / 2);

        while index < data.len() {
            let r = self.low_half(timer);
            if r != Outcome::Ok {
                return r;
            }
            let c = timer.counter();

            if (self.wide_lo / 2..=self.wide_hi / 2).contains(&c) {
                current |= mask;
            } else if !(self.narrow_lo / 2..self.wide_lo / 2).contains(&c) {
                return Outcome::AmbiguousBit;
            }
            self.valid_bits += 1;

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
}
