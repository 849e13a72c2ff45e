//! Classic Turbo 2000 block decoder (Czechoslovakia).
//!
//! Self-clocking pulse-width modulation: a long pilot tone, one short sync
//! pulse, then one pulse per bit, MSB first. The last byte is an XOR-fold
//! checksum.

use super::detail;
use crate::checksum::check_xor_block;
use crate::config::DecoderConfig;
use crate::logging::DecoderLog;
use crate::outcome::{BlockDecodeResult, Outcome};
use crate::pulse::{PulseTimer, SampleSource};
use crate::rescale;

const PFX: &str = "T2000";

/// Reference pulse widths in samples at 44100 Hz.
const PILOT_HI: u32 = 47;
const PILOT_LO: u32 = 25;
const SYNC_HI: u32 = 19;
const SYNC_LO: u32 = 2;
const WIDE_HI: u32 = 40;
const WIDE_LO: u32 = 20;
const NARROW_LO: u32 = 6;
const MAX_PULSE: u32 = 50;

pub struct Turbo2000BlockDecoder {
    pilot_hi: u32,
    pilot_lo: u32,
    sync_hi: u32,
    sync_lo: u32,
    wide_hi: u32,
    wide_lo: u32,
    narrow_lo: u32,
    max_pulse: u32,
    min_pilot_pulses: u32,
    config: DecoderConfig,
    valid_bytes: usize,
}

impl Turbo2000BlockDecoder {
    pub fn new(sample_rate: u32, config: &DecoderConfig, min_pilot_pulses: u32) -> Self {
        Turbo2000BlockDecoder {
            pilot_hi: rescale(PILOT_HI, sample_rate),
            pilot_lo: rescale(PILOT_LO, sample_rate),
            sync_hi: rescale(SYNC_HI, sample_rate),
            sync_lo: rescale(SYNC_LO, sample_rate),
            wide_hi: rescale(WIDE_HI, sample_rate),
            wide_lo: rescale(WIDE_LO, sample_rate),
            narrow_lo: rescale(NARROW_LO, sample_rate),
            max_pulse: rescale(MAX_PULSE, sample_rate),
            min_pilot_pulses,
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

            let outcome = if check_xor_block(&data) {
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

            // Longer than half a sync pulse means this was still a pilot
            // tone half-wave.
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
}
