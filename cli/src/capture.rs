//! Live-capture sample source backed by the default audio input device.
//!
//! The cpal callback pushes PCM samples into a shared queue; the decoder
//! thread blocks on the queue one sample at a time. Device sources are not
//! positionable. An emergency stop pauses the stream in addition to raising
//! the cooperative flag.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use tapedec_core::pulse::dsp::{DcBlocker, Schmitt};
use tapedec_core::pulse::{SampleOutcome, SampleSource, StopFlag};
use tapedec_core::{DecoderConfig, Result, TapeError};

const CAPTURE_RATE: u32 = 44_100;

/// Seconds without any device data before the source reports an I/O error.
const STARVATION_TIMEOUT: Duration = Duration::from_secs(10);

struct SharedQueue {
    queue: Mutex<VecDeque<i32>>,
    available: Condvar,
}

pub struct CaptureSampleSource {
    stream: Stream,
    shared: Arc<SharedQueue>,
    io_error: Arc<AtomicBool>,
    position: u64,
    sample_rate: u32,
    dc_blocker: Option<DcBlocker>,
    schmitt: Option<Schmitt>,
    paused: bool,
    stop: StopFlag,
}

impl CaptureSampleSource {
    pub fn open(config: &DecoderConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| TapeError::AudioDevice("No input device found".to_string()))?;

        let stream_config = StreamConfig {
            channels: 1,
            sample_rate: SampleRate(CAPTURE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::new(SharedQueue {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        });
        let io_error = Arc::new(AtomicBool::new(false));

        let cb_shared = Arc::clone(&shared);
        let cb_error = Arc::clone(&io_error);
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mut queue = cb_shared.queue.lock().unwrap();
                    for &s in data {
                        queue.push_back((s * 32_767.0) as i32);
                    }
                    cb_shared.available.notify_one();
                },
                move |err| {
                    log::error!("Audio input error: {err}");
                    cb_error.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| TapeError::AudioDevice(e.to_string()))?;

        stream
            .play()
            .map_err(|e| TapeError::AudioDevice(e.to_string()))?;

        Ok(CaptureSampleSource {
            stream,
            shared,
            io_error,
            position: 0,
            sample_rate: CAPTURE_RATE,
            dc_blocker: config.dsp_block_dc_offset.then(DcBlocker::default),
            schmitt: (config.dsp_schmitt_hysteresis > 0)
                .then(|| Schmitt::new(config.dsp_schmitt_hysteresis, 0)),
            paused: false,
            stop: StopFlag::new(),
        })
    }

    fn pull_sample(&mut self) -> Option<i32> {
        let mut queue = self.shared.queue.lock().unwrap();
        loop {
            if let Some(s) = queue.pop_front() {
                return Some(s);
            }
            if self.io_error.load(Ordering::SeqCst) {
                return None;
            }
            let (q, timeout) = self
                .shared
                .available
                .wait_timeout(queue, STARVATION_TIMEOUT)
                .unwrap();
            queue = q;
            if timeout.timed_out() && queue.is_empty() {
                self.io_error.store(true, Ordering::SeqCst);
                return None;
            }
        }
    }
}

impl SampleSource for CaptureSampleSource {
    fn next_level(&mut self) -> SampleOutcome {
        if self.stop.take_stop() {
            if self.stop.emergency_requested() && !self.paused {
                if let Err(e) = self.stream.pause() {
                    log::error!("Failed to pause capture stream: {e}");
                }
                self.paused = true;
            }
            return SampleOutcome::Cancelled;
        }

        let raw = match self.pull_sample() {
            Some(s) => s,
            None => return SampleOutcome::IoError,
        };

        self.position += 1;
        let conditioned = match self.dc_blocker.as_mut() {
            Some(f) => f.output(raw),
            None => raw,
        };
        let level = match self.schmitt.as_mut() {
            Some(s) => s.output(conditioned),
            None => conditioned >= 0,
        };
        SampleOutcome::Level(level)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }
}
