//! Signal conditioning in front of the level threshold.

/// One-pole DC blocking filter. Removes the slowly drifting offset that
/// cheap tape-deck line outputs superimpose on the signal.
#[derive(Debug)]
pub struct DcBlocker {
    xm1: i32,
    ym1: i32,
    time_constant: f64,
}

impl DcBlocker {
    pub const DEFAULT_TIME_CONSTANT: f64 = 0.995;

    pub fn new(time_constant: f64) -> Self {
        DcBlocker {
            xm1: 0,
            ym1: 0,
            time_constant,
        }
    }

    pub fn reset(&mut self) {
        self.xm1 = 0;
        self.ym1 = 0;
    }

    pub fn output(&mut self, input: i32) -> i32 {
        let out = input - self.xm1 + (self.time_constant * self.ym1 as f64).round() as i32;
        self.xm1 = input;
        self.ym1 = out;
        out
    }
}

impl Default for DcBlocker {
    fn default() -> Self {
        DcBlocker::new(DcBlocker::DEFAULT_TIME_CONSTANT)
    }
}

/// Schmitt trigger with configurable hysteresis around a threshold.
#[derive(Debug)]
pub struct Schmitt {
    tolerance: i32,
    threshold: i32,
    prev_sample: i32,
    current_output: bool,
}

impl Schmitt {
    pub fn new(tolerance: i32, threshold: i32) -> Self {
        Schmitt {
            tolerance,
            threshold,
            prev_sample: 0,
            current_output: false,
        }
    }

    pub fn output(&mut self, sample: i32) -> bool {
        self.current_output = if self.current_output {
            sample >= self.threshold + (self.prev_sample - self.tolerance)
        } else {
            sample > self.threshold + (self.prev_sample + self.tolerance)
        };
        self.prev_sample = sample;
        self.current_output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_blocker_removes_constant_offset() {
        let mut f = DcBlocker::default();
        let mut last = 0;
        for _ in 0..4_000 {
            last = f.output(1_000);
        }
        assert!(last.abs() < 50, "offset not removed: {last}");
    }

    #[test]
    fn dc_blocker_passes_transitions() {
        let mut f = DcBlocker::default();
        for _ in 0..100 {
            f.output(0);
        }
        let step = f.output(10_000);
        assert!(step > 9_000);
    }

    #[test]
    fn schmitt_ignores_small_wiggles() {
        let mut s = Schmitt::new(50, 0);
        assert!(!s.output(10));
        assert!(!s.output(40)); // below prev + tolerance
        assert!(s.output(500)); // real rise
        assert!(s.output(480)); // small dip keeps state
    }
}
