//! Shared helpers: synthetic pulse-train construction for the tape protocols.
#![allow(dead_code)]

use tapedec_core::pulse::MemorySampleSource;

/// Square-wave builder. Levels start low; every half-wave toggles.
pub struct PulseTrain {
    levels: Vec<bool>,
    level: bool,
}

impl PulseTrain {
    pub fn new() -> Self {
        PulseTrain {
            levels: Vec::new(),
            level: false,
        }
    }

    /// Hold the current level for `n` samples.
    pub fn silence(&mut self, n: usize) {
        self.levels.extend(std::iter::repeat(self.level).take(n));
    }

    /// Toggle the level and hold it for `w` samples.
    pub fn half_wave(&mut self, w: u32) {
        self.level = !self.level;
        self.levels
            .extend(std::iter::repeat(self.level).take(w as usize));
    }

    /// One full pulse: two half-waves.
    pub fn pulse(&mut self, w1: u32, w2: u32) {
        self.half_wave(w1);
        self.half_wave(w2);
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn into_source(self, sample_rate: u32) -> MemorySampleSource {
        MemorySampleSource::new(self.levels, sample_rate)
    }
}

/// Append an XOR-fold checksum byte.
pub fn with_xor_checksum(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    out.push(data.iter().fold(0u8, |a, &b| a ^ b));
    out
}

/// Append an additive mod-256 checksum byte.
pub fn with_additive_checksum(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    out.push(data.iter().fold(0u8, |a, &b| a.wrapping_add(b)));
    out
}

/// Widths for a protocol whose bits are full pulses. All values are
/// half-wave widths; a bit pulse is symmetric.
pub struct BitTiming {
    pub pilot_half: u32,
    pub sync_half: u32,
    pub narrow_half: u32,
    pub wide_half: u32,
}

/// Turbo 2000 timing at 44100 Hz: pilot 40, sync 8, narrow 12, wide 30.
pub const T2K_TIMING: BitTiming = BitTiming {
    pilot_half: 20,
    sync_half: 4,
    narrow_half: 6,
    wide_half: 15,
};

/// Super Turbo timing: pilot 30 calibrates wide/narrow around 22.
pub const ST_TIMING: BitTiming = BitTiming {
    pilot_half: 15,
    sync_half: 5,
    narrow_half: 9,
    wide_half: 18,
};

/// Turbo ROM timing: pilot 24, sync 6, narrow 8, wide 20.
pub const ROM_TIMING: BitTiming = BitTiming {
    pilot_half: 12,
    sync_half: 3,
    narrow_half: 4,
    wide_half: 10,
};

/// Encode one MSB-first pulse-per-bit block (Turbo 2000 family).
pub fn encode_block_msb(train: &mut PulseTrain, timing: &BitTiming, data: &[u8], pilot: usize) {
    train.silence(100);
    for _ in 0..pilot {
        train.pulse(timing.pilot_half, timing.pilot_half);
    }
    train.pulse(timing.sync_half, timing.sync_half);
    for &byte in data {
        for bit in (0..8).rev() {
            let half = if byte >> bit & 1 == 1 {
                timing.wide_half
            } else {
                timing.narrow_half
            };
            train.pulse(half, half);
        }
    }
    // Trailing edge so the last bit's measurement terminates.
    train.half_wave(timing.narrow_half);
}

/// Encode one LSB-first pulse-per-bit block (Turbo ROM, AST).
pub fn encode_block_lsb(train: &mut PulseTrain, timing: &BitTiming, data: &[u8], pilot: usize) {
    train.silence(100);
    for _ in 0..pilot {
        train.pulse(timing.pilot_half, timing.pilot_half);
    }
    train.pulse(timing.sync_half, timing.sync_half);
    for &byte in data {
        for bit in 0..8 {
            let half = if byte >> bit & 1 == 1 {
                timing.wide_half
            } else {
                timing.narrow_half
            };
            train.pulse(half, half);
        }
    }
    train.half_wave(timing.narrow_half);
}

/// Encode a Super Turbo block: short leader so the adaptive calibration sees
/// pilot pulses almost immediately.
pub fn encode_st_block(train: &mut PulseTrain, data: &[u8], pilot: usize) {
    train.silence(10);
    for _ in 0..pilot {
        train.pulse(ST_TIMING.pilot_half, ST_TIMING.pilot_half);
    }
    train.pulse(ST_TIMING.sync_half, ST_TIMING.sync_half);
    for &byte in data {
        for bit in (0..8).rev() {
            let half = if byte >> bit & 1 == 1 {
                ST_TIMING.wide_half
            } else {
                ST_TIMING.narrow_half
            };
            train.pulse(half, half);
        }
    }
    train.half_wave(ST_TIMING.narrow_half);
}

/// Encode a KSO block: bits live in the low half-wave only, and the first
/// data bit doubles as the sync pulse.
pub fn encode_kso_block(train: &mut PulseTrain, data: &[u8], pilot: usize) {
    const PILOT_LOW: u32 = 20;
    const HIGH: u32 = 10;
    const NARROW_LOW: u32 = 5;
    const WIDE_LOW: u32 = 11;

    train.silence(100);
    for _ in 0..pilot {
        train.pulse(HIGH, PILOT_LOW);
    }
    for &byte in data {
        for bit in (0..8).rev() {
            let low = if byte >> bit & 1 == 1 {
                WIDE_LOW
            } else {
                NARROW_LOW
            };
            train.pulse(HIGH, low);
        }
    }
    train.half_wave(HIGH);
}

/// Encode a Turbo Blizzard block: sync marker is two narrow pulses.
pub fn encode_blizzard_block(train: &mut PulseTrain, data: &[u8], pilot: usize) {
    const PILOT_HALF: u32 = 15;
    const SYNC_HALF: u32 = 4;
    const NARROW_HALF: u32 = 4;
    const WIDE_HALF: u32 = 7;

    train.silence(100);
    for _ in 0..pilot {
        train.pulse(PILOT_HALF, PILOT_HALF);
    }
    train.pulse(SYNC_HALF, SYNC_HALF);
    train.pulse(SYNC_HALF, SYNC_HALF);
    for &byte in data {
        for bit in (0..8).rev() {
            let half = if byte >> bit & 1 == 1 {
                WIDE_HALF
            } else {
                NARROW_HALF
            };
            train.pulse(half, half);
        }
    }
    train.half_wave(NARROW_HALF);
}
