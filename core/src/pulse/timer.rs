//! Edge-detection and interval-counting primitives shared by all decoders.

use super::{SampleOutcome, SampleSource, StopFlag};
use crate::outcome::Outcome;

/// Wraps a [`SampleSource`] with a resettable sample counter bounded by a
/// caller-set timeout. All block decoders measure pulses through this.
pub struct PulseTimer<S: SampleSource> {
    source: S,
    counter: u32,
    timeout: u32,
    last_level: Option<bool>,
}

impl<S: SampleSource> PulseTimer<S> {
    pub fn new(source: S) -> Self {
        PulseTimer {
            source,
            counter: 0,
            timeout: u32::MAX,
            last_level: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }

    pub fn position(&self) -> u64 {
        self.source.position()
    }

    pub fn is_seekable(&self) -> bool {
        self.source.is_seekable()
    }

    pub fn seek(&mut self, sample: u64) {
        self.source.seek(sample);
        self.last_level = None;
    }

    pub fn stop_flag(&self) -> &StopFlag {
        self.source.stop_flag()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Maximum samples counted before an operation gives up with
    /// [`Outcome::PulseTooLong`].
    pub fn set_timeout(&mut self, samples: u32) {
        self.timeout = samples;
    }

    pub fn set_counter(&mut self, value: u32) {
        self.counter = value;
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    fn next_level(&mut self) -> Result<bool, Outcome> {
        match self.source.next_level() {
            SampleOutcome::Level(l) => Ok(l),
            SampleOutcome::EndOfStream => Err(Outcome::EndOfStream),
            SampleOutcome::IoError => Err(Outcome::IoError),
            SampleOutcome::Cancelled => Err(Outcome::Cancelled),
        }
    }

    /// Count samples until the logical level changes.
    pub fn count_until_any_edge(&mut self) -> Outcome {
        loop {
            let level = match self.next_level() {
                Ok(l) => l,
                Err(o) => return o,
            };

            self.counter += 1;
            if self.counter > self.timeout {
                return Outcome::PulseTooLong;
            }

            match self.last_level {
                Some(last) if last != level => {
                    self.last_level = Some(level);
                    return Outcome::Ok;
                }
                None => {
                    self.last_level = Some(level);
                }
                _ => {}
            }
        }
    }

    fn specific_edge(&mut self, rising: bool, counted: bool) -> Outcome {
        let before = !rising;
        let after = rising;
        let mut last: Option<bool> = None;

        loop {
            let level = match self.next_level() {
                Ok(l) => l,
                Err(o) => return o,
            };

            if counted {
                self.counter += 1;
                if self.counter > self.timeout {
                    return Outcome::PulseTooLong;
                }
            }

            self.last_level = Some(level);
            if last == Some(before) && level == after {
                return Outcome::Ok;
            }
            last = Some(level);
        }
    }

    /// Resynchronize to a 0→1 transition; samples are not counted.
    pub fn wait_for_rising_edge(&mut self) -> Outcome {
        self.specific_edge(true, false)
    }

    /// Resynchronize to a 1→0 transition; samples are not counted.
    pub fn wait_for_falling_edge(&mut self) -> Outcome {
        self.specific_edge(false, false)
    }

    /// Count samples until a 0→1 transition, bounded by the timeout.
    pub fn count_until_rising_edge(&mut self) -> Outcome {
        self.specific_edge(true, true)
    }

    /// Count samples until a 1→0 transition, bounded by the timeout.
    pub fn count_until_falling_edge(&mut self) -> Outcome {
        self.specific_edge(false, true)
    }

    /// Wait for an edge, then count until the next one. The counter value at
    /// return time is the full pulse width in samples (plus whatever the
    /// counter already held).
    pub fn measure_pulse(&mut self) -> Outcome {
        let r = self.count_until_any_edge();
        if r != Outcome::Ok {
            return r;
        }

        loop {
            let level = match self.next_level() {
                Ok(l) => l,
                Err(o) => return o,
            };

            self.counter += 1;
            if self.counter > self.timeout {
                return Outcome::PulseTooLong;
            }

            if self.last_level != Some(level) {
                self.last_level = Some(level);
                return Outcome::Ok;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::MemorySampleSource;

    fn square(half_widths: &[u32]) -> Vec<bool> {
        let mut levels = Vec::new();
        let mut level = false;
        for &w in half_widths {
            level = !level;
            levels.extend(std::iter::repeat(level).take(w as usize));
        }
        levels
    }

    #[test]
    fn measure_pulse_counts_full_period() {
        // Leader low, then a 10+10 square pulse.
        let mut levels = vec![false; 5];
        levels.extend(square(&[10, 10, 10, 10]));
        let mut timer = PulseTimer::new(MemorySampleSource::new(levels, 44_100));
        timer.set_timeout(1_000);

        assert_eq!(timer.wait_for_rising_edge(), Outcome::Ok);
        timer.set_counter(0);
        assert_eq!(timer.measure_pulse(), Outcome::Ok);
        // Each measurement runs from just past one edge to just past the
        // second-next edge: a full 10+10 period.
        assert_eq!(timer.counter(), 20);
        timer.set_counter(0);
        assert_eq!(timer.measure_pulse(), Outcome::Ok);
        assert_eq!(timer.counter(), 20);
    }

    #[test]
    fn count_until_any_edge_times_out() {
        let mut timer = PulseTimer::new(MemorySampleSource::new(vec![false; 100], 44_100));
        timer.set_timeout(10);
        timer.set_counter(0);
        assert_eq!(timer.count_until_any_edge(), Outcome::PulseTooLong);
    }

    #[test]
    fn specific_edge_requires_polarity() {
        // 1-level leader; falling edge comes before the next rising one.
        let mut levels = vec![true; 4];
        levels.extend(vec![false; 4]);
        levels.extend(vec![true; 4]);
        let mut timer = PulseTimer::new(MemorySampleSource::new(levels, 44_100));
        timer.set_timeout(100);

        assert_eq!(timer.wait_for_falling_edge(), Outcome::Ok);
        assert_eq!(timer.position(), 5);
        timer.set_counter(0);
        assert_eq!(timer.count_until_rising_edge(), Outcome::Ok);
        assert_eq!(timer.counter(), 4);
    }

    #[test]
    fn stream_end_reported_after_final_edge() {
        let mut timer = PulseTimer::new(MemorySampleSource::new(vec![false; 4], 44_100));
        timer.set_timeout(100);
        timer.set_counter(0);
        // The synthetic closing edge terminates the first measurement...
        assert_eq!(timer.count_until_any_edge(), Outcome::Ok);
        // ...and the next read reports the end of the stream.
        assert_eq!(timer.count_until_any_edge(), Outcome::EndOfStream);
    }
}
