//! Turbo Blizzard block decoder (Poland).
//!
//! Files open with a long pilot terminated by a pair of narrow pulses; a
//! zero-length block request consumes just that synchronization marker. With
//! adaptive speed detection the boundaries are derived from four measured
//! pilot pulses and can be adopted by the sibling data-block decoder.
//! Checksums are additive modulo 256.

use super::detail;
use crate::checksum::check_additive_block;
use crate::config::DecoderConfig;
use crate::logging::DecoderLog;
use crate::outcome::{BlockDecodeResult, Outcome};
use crate::pulse::{PulseTimer, SampleSource};
use crate::rescale;

const PFX: &str = "BLIZZARD";

const PILOT_HI: u32 = 36;
const PILOT_LO: u32 = 19;
const MAX_4PILOT: u32 = 3 * 35;
const WIDE_HI: u32 = 18;
const WIDE_LO: u32 = 10;
const NARROW_LO: u32 = 4;
const MAX_PULSE: u32 = 40;

pub struct BlizzardBlockDecoder {
    pilot_hi: u32,
    pilot_lo: u32,
    max_4pilot: u32,
    wide_hi: u32,
    wide_lo: u32,
    narrow_lo: u32,
    max_pulse: u32,
    sync: bool,
    pilot_tone_pulses: u32,
    config: DecoderConfig,
    valid_bytes: usize,
}

impl BlizzardBlockDecoder {
    /// `sync` marks the decoder used for the leading synchronization block;
    /// only that one runs adaptive speed detection.
    pub fn new(
        sample_rate: u32,
        config: &DecoderConfig,
        sync: bool,
        pilot_tone_pulses: u32,
    ) -> Self {
        BlizzardBlockDecoder {
            pilot_hi: rescale(PILOT_HI, sample_rate),
            pilot_lo: rescale(PILOT_LO, sample_rate),
            max_4pilot: rescale(MAX_4PILOT, sample_rate),
            wide_hi: rescale(WIDE_HI, sample_rate),
            wide_lo: rescale(WIDE_LO, sample_rate),
            narrow_lo: rescale(NARROW_LO, sample_rate),
            max_pulse: rescale(MAX_PULSE, sample_rate),
            sync,
            pilot_tone_pulses,
            config: config.clone(),
            valid_bytes: 0,
        }
    }

    /// Adopt the transfer speed another decoder calibrated adaptively.
    pub fn adopt_speed(&mut self, other: &BlizzardBlockDecoder) {
        self.pilot_hi = other.pilot_hi;
        self.pilot_lo = other.pilot_lo;
        self.wide_hi = other.wide_hi;
        self.wide_lo = other.wide_lo;
        self.narrow_lo = other.narrow_lo;
        self.max_4pilot = other.max_4pilot;
        self.max_pulse = other.max_pulse;
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
                    "Pulse ranges: NL {},WL {}, WH {},PL {}, PH {}, MP {}",
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
            let r = if self.sync && self.config.prefer_adaptive_speed_detection {
                self.wait_for_pilot_adaptive(timer)
            } else {
                self.wait_for_pilot(timer)
            };
            if r.is_stream_fatal() {
                return BlockDecodeResult::new(Vec::new(), 0, r, timer.position());
            }
            if r != Outcome::Ok {
                continue;
            }
            if self.config.verbose {
                detail(log, PFX, format!("Pilot tone found {{{}}}", timer.position()));
            }

            // A zero-length block only consumes the sync marker, and the
            // marker's terminating edge check is skipped for it.
            let r = self.wait_for_sync(timer, !data.is_empty());
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

            if data.is_empty() {
                return BlockDecodeResult::new(data, 0, Outcome::Ok, timer.position());
            }

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
            if pulses >= self.pilot_tone_pulses {
                return Outcome::Ok;
            }
        }
    }

    /// Derive the pulse boundaries from four measured pilot pulses, then
    /// require a quarter of the pilot run at that speed; repeated four times.
    fn wait_for_pilot_adaptive<S: SampleSource>(&mut self, timer: &mut PulseTimer<S>) -> Outcome {
        timer.set_timeout(self.max_pulse);
        timer.set_counter(0);
        let r = timer.wait_for_rising_edge();
        if r != Outcome::Ok {
            return r;
        }

        for _round in 0..4 {
            timer.set_timeout(self.max_4pilot);
            timer.set_counter(0);
            for _ in 0..4 {
                let r = timer.measure_pulse();
                if r != Outcome::Ok {
                    return r;
                }
            }
            let c = timer.counter();

            let c_pilot = c / 4;
            let c_wide = c / 8;
            let c_narrow = c / 12;

            self.pilot_hi = c / 2;
            self.pilot_lo = c_wide + (c_pilot - c_wide) / 2;
            self.wide_hi = self.pilot_lo - 1;
            self.wide_lo = c_narrow + (c_wide - c_narrow) / 2;
            self.narrow_lo = c_narrow / 2;

            timer.set_counter(0);
            timer.set_timeout(self.max_pulse);
            let r = timer.count_until_any_edge();
            if r != Outcome::Ok {
                return r;
            }

            let mut h = 0;
            timer.set_timeout(self.pilot_hi);
            while h < self.pilot_tone_pulses / 4 {
                timer.set_counter(0);
                let r = timer.measure_pulse();
                if r != Outcome::Ok {
                    return r;
                }
                if timer.counter() < self.pilot_lo {
                    return Outcome::UnexpectedPulseWidth;
                }
                h += 1;
            }
        }

        Outcome::Ok
    }

    /// The sync marker is a pair of narrow pulses following the pilot.
    fn wait_for_sync<S: SampleSource>(
        &self,
        timer: &mut PulseTimer<S>,
        check_for_last_edge: bool,
    ) -> Outcome {
        loop {
            timer.set_counter(0);
            let r = timer.count_until_any_edge();
            if r != Outcome::Ok {
                return r;
            }
            let c = timer.counter();

            // Still a pilot half-wave.
            if c > self.wide_hi / 2 {
                continue;
            }

            if c <= self.wide_lo / 2 {
                if !check_for_last_edge {
                    return Outcome::Ok;
                }

                let r = timer.count_until_any_edge();
                if r != Outcome::Ok {
                    return r;
                }

                timer.set_counter(0);
                let r = timer.count_until_any_edge();
                if r != Outcome::Ok {
                    return r;
                }
                if timer.counter() <= self.wide_lo / 2 {
                    return timer.count_until_any_edge();
                }
            }

            return Outcome::UnexpectedPulseWidth;
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
