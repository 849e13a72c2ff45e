//! WAV-file-backed sample source.
//!
//! Reads 8/16-bit PCM, mono or stereo (channel selectable), 44100-705600 Hz,
//! and thresholds each PCM sample to a binary level, optionally through a DC
//! blocking filter and a Schmitt trigger.

use std::path::Path;

use tapedec_core::pulse::dsp::{DcBlocker, Schmitt};
use tapedec_core::pulse::{SampleOutcome, SampleSource, StopFlag};
use tapedec_core::{DecoderConfig, Result, TapeError};

/// Which channel of a stereo recording carries the tape signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Channel {
    #[default]
    Mono,
    Left,
    Right,
}

pub struct WavSampleSource {
    samples: Vec<i32>,
    pos: usize,
    sample_rate: u32,
    dc_blocker: Option<DcBlocker>,
    schmitt: Option<Schmitt>,
    last_level: bool,
    past_end: bool,
    stop: StopFlag,
}

impl WavSampleSource {
    pub fn open(path: &Path, channel: Channel, config: &DecoderConfig) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| TapeError::WaveFormat(e.to_string()))?;
        let spec = reader.spec();

        if spec.sample_format != hound::SampleFormat::Int {
            return Err(TapeError::WaveFormat(
                "Audio format is not integer PCM".to_string(),
            ));
        }
        if spec.channels < 1 || spec.channels > 2 {
            return Err(TapeError::WaveFormat(format!(
                "Wave file has {} channels, only 1 or 2 are supported",
                spec.channels
            )));
        }
        if spec.bits_per_sample != 8 && spec.bits_per_sample != 16 {
            return Err(TapeError::WaveFormat(
                "Wave file data format is not 8-bit or 16-bit".to_string(),
            ));
        }
        if !(44_100..=705_600).contains(&spec.sample_rate) {
            return Err(TapeError::WaveFormat(
                "Wave file sample rate is not between 44100 and 705600 Hz".to_string(),
            ));
        }

        let byte_index = match (spec.channels, channel) {
            (1, _) => 0,
            (_, Channel::Right) => 1,
            _ => 0,
        };

        // Pull the selected channel into memory; seeking and rescanning are
        // frequent during recovery, decoding is not.
        let channels = spec.channels as usize;
        let mut samples = Vec::new();
        for (i, s) in reader.samples::<i32>().enumerate() {
            let s = s.map_err(|e| TapeError::WaveFormat(e.to_string()))?;
            if i % channels == byte_index {
                samples.push(s);
            }
        }

        log::debug!(
            "{}: {} samples, {} Hz, {} bits, channel {:?}",
            path.display(),
            samples.len(),
            spec.sample_rate,
            spec.bits_per_sample,
            channel
        );

        Ok(WavSampleSource {
            samples,
            pos: 0,
            sample_rate: spec.sample_rate,
            dc_blocker: config.dsp_block_dc_offset.then(DcBlocker::default),
            schmitt: (config.dsp_schmitt_hysteresis > 0)
                .then(|| Schmitt::new(config.dsp_schmitt_hysteresis, 0)),
            last_level: false,
            past_end: false,
            stop: StopFlag::new(),
        })
    }

    pub fn total_samples(&self) -> u64 {
        self.samples.len() as u64
    }

    fn threshold(&mut self, raw: i32) -> bool {
        // 8-bit PCM is unsigned on disk; hound centers it around zero when
        // reading, so both widths threshold at zero here.
        let conditioned = match self.dc_blocker.as_mut() {
            Some(f) => f.output(raw),
            None => raw,
        };
        match self.schmitt.as_mut() {
            Some(s) => s.output(conditioned),
            None => conditioned >= 0,
        }
    }
}

impl SampleSource for WavSampleSource {
    fn next_level(&mut self) -> SampleOutcome {
        if self.stop.take_stop() {
            return SampleOutcome::Cancelled;
        }
        if self.past_end {
            return SampleOutcome::EndOfStream;
        }
        match self.samples.get(self.pos).copied() {
            Some(raw) => {
                self.pos += 1;
                let level = self.threshold(raw);
                self.last_level = level;
                SampleOutcome::Level(level)
            }
            None => {
                // End of data counts as one final level change so a pulse in
                // progress still terminates.
                self.past_end = true;
                SampleOutcome::Level(!self.last_level)
            }
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, sample: u64) {
        self.pos = (sample as usize).min(self.samples.len());
        self.past_end = false;
        if let Some(f) = self.dc_blocker.as_mut() {
            f.reset();
        }
    }

    fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }
}
