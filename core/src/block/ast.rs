//! Atari Super Turbo block decoder (Poland).
//!
//! Adaptive like Super Turbo, but bits are packed LSB first and the checksum
//! expectation comes from the outside: 0 for the header block, a per-segment
//! value from the header for data blocks.

use super::detail;
use crate::checksum::check_xor_expected;
use crate::config::DecoderConfig;
use crate::logging::DecoderLog;
use crate::outcome::{BlockDecodeResult, Outcome};
use crate::pulse::{PulseTimer, SampleSource};
use crate::rescale;

const PFX: &str = "AST";

const MAX_3PILOT: u32 = 200;
const MAX_PULSE: u32 = 50;

const MIN_PILOT_PULSES: u32 = 256;

#[derive(Debug, Clone, Copy)]
struct SpeedRates {
    hi: u32,
    med: u32,
}

pub struct AstBlockDecoder {
    max_3pilot: u32,
    max_pulse: u32,
    expected_checksum: u8,
    config: DecoderConfig,
    valid_bytes: usize,
}

impl AstBlockDecoder {
    pub fn new(sample_rate: u32, config: &DecoderConfig) -> Self {
        AstBlockDecoder {
            max_3pilot: rescale(MAX_3PILOT, sample_rate),
            max_pulse: rescale(MAX_PULSE, sample_rate),
            expected_checksum: 0,
            config: config.clone(),
            valid_bytes: 0,
        }
    }

    /// Checksum the next block is expected to fold to.
    pub fn set_expected_checksum(&mut self, checksum: u8) {
        self.expected_checksum = checksum;
    }

    pub fn decode_block<S: SampleSource>(
        &mut self,
        timer: &mut PulseTimer<S>,
        len: usize,
        log: &mut dyn DecoderLog,
    ) -> BlockDecodeResult {
        let mut data = vec![0u8; len];
        self.valid_bytes = 0;

        loop {
            let (r, rates) = self.wait_for_pilot(timer);
            if r.is_stream_fatal() {
                return BlockDecodeResult::new(Vec::new(), 0, r, timer.position());
            }
            if r != Outcome::Ok {
                continue;
            }
            let rates = rates.expect("rates derived on pilot lock");
            if self.config.verbose {
                detail(
                    log,
                    PFX,
                    format!(
                        "Pilot tone found. Pulse boundaries: {},{}. {{{}}}",
                        rates.med,
                        rates.hi,
                        timer.position()
                    ),
                );
            }

            let r = self.wait_for_sync(timer, rates);
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

            let r = self.decode_data(timer, rates, &mut data);

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

            let outcome = if check_xor_expected(&data, self.expected_checksum) {
                Outcome::Ok
            } else if self.config.tolerate_bad_checksum {
                Outcome::ChecksumWarning
            } else {
                Outcome::ChecksumBad
            };
            return BlockDecodeResult::new(data, self.valid_bytes, outcome, timer.position());
        }
    }

    fn wait_for_pilot<S: SampleSource>(
        &mut self,
        timer: &mut PulseTimer<S>,
    ) -> (Outcome, Option<SpeedRates>) {
        let mut rates = SpeedRates { hi: 0, med: 0 };

        timer.set_timeout(self.max_pulse);
        timer.set_counter(0);

        for _round in 0..4 {
            timer.set_timeout(self.max_3pilot);
            timer.set_counter(0);
            for _ in 0..3 {
                let r = timer.measure_pulse();
                if r != Outcome::Ok {
                    return (r, None);
                }
            }
            let c = timer.counter();
            rates = SpeedRates { hi: c / 2, med: c / 4 };

            timer.set_counter(0);
            timer.set_timeout(self.max_pulse);
            let r = timer.count_until_any_edge();
            if r != Outcome::Ok {
                return (r, None);
            }

            let mut h = 0;
            timer.set_timeout(rates.hi);
            while h < MIN_PILOT_PULSES {
                timer.set_counter(0);
                let r = timer.measure_pulse();
                if r != Outcome::Ok {
                    return (r, None);
                }
                if timer.counter() < rates.med {
                    return (Outcome::UnexpectedPulseWidth, None);
                }
                h += 1;
            }
        }

        (Outcome::Ok, Some(rates))
    }

    fn wait_for_sync<S: SampleSource>(
        &self,
        timer: &mut PulseTimer<S>,
        rates: SpeedRates,
    ) -> Outcome {
        timer.set_timeout(self.max_pulse);

        loop {
            timer.set_counter(0);
            let r = timer.count_until_any_edge();
            if r != Outcome::Ok {
                return r;
            }
            if timer.counter() > rates.med / 2 {
                continue;
            }
            return timer.count_until_any_edge();
        }
    }

    fn decode_data<S: SampleSource>(
        &mut self,
        timer: &mut PulseTimer<S>,
        rates: SpeedRates,
        data: &mut [u8],
    ) -> Outcome {
        let mut index = 0;
        let mut mask = 0x01u8;
        let mut current = 0u8;

        timer.set_timeout(rates.hi);

        while index < data.len() {
            timer.set_counter(0);
            let r = timer.measure_pulse();
            if r != Outcome::Ok {
                return r;
            }
            if timer.counter() > rates.med {
                current |= mask;
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
