//! Command-line shell for the turbo tape decoder.

mod capture;
mod wav;

use std::io::BufRead;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use tapedec_core::config::{KsoFileFormat, LowerSilesianFileFormat, TurboRomFileFormat};
use tapedec_core::file::{self, DecodeSession, ScanControl, TapeFormat};
use tapedec_core::logging::{DecoderLog, DecoderMessage, Severity};
use tapedec_core::pulse::{PulseTimer, SampleSource};
use tapedec_core::writer::DiskWriter;
use tapedec_core::DecoderConfig;

use capture::CaptureSampleSource;
use wav::{Channel, WavSampleSource};

#[derive(Parser)]
#[command(name = "tapedec")]
#[command(about = "Decoder for turbo cassette tape recordings of 8-bit Atari computers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode every file found in a WAV recording
    Decode {
        /// Input WAV file (8/16-bit PCM, 44100-705600 Hz)
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Channel of a stereo recording to decode
        #[arg(long, value_enum, default_value_t = Channel::Mono)]
        channel: Channel,

        #[command(flatten)]
        opts: DecodeOpts,
    },

    /// Decode live from the default audio input device (Enter stops)
    Listen {
        #[command(flatten)]
        opts: DecodeOpts,
    },

    /// Dump raw blocks of one turbo system without file framing
    Monitor {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Channel of a stereo recording to decode
        #[arg(long, value_enum, default_value_t = Channel::Mono)]
        channel: Channel,

        /// Keep framing bytes instead of trimming to the payload
        #[arg(long)]
        all_bytes: bool,

        #[command(flatten)]
        opts: DecodeOpts,
    },

    /// List the supported tape formats
    Formats,
}

#[derive(Args)]
struct DecodeOpts {
    /// Tape format (brief name, see `tapedec formats`)
    #[arg(short, long, default_value = "t2000", value_parser = parse_format)]
    format: TapeFormat,

    /// Output directory for decoded files
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Accept blocks with a bad checksum, flagged as warnings
    #[arg(long)]
    tolerate_bad_checksum: bool,

    /// Derive pulse widths from the observed pilot tone speed
    #[arg(long)]
    adaptive: bool,

    /// Do not prefix output names with the absolute sample number
    #[arg(long)]
    no_sample_prefix: bool,

    /// Report pilot/sync/bit level detail
    #[arg(long)]
    verbose: bool,

    /// Disable the DC blocking filter
    #[arg(long)]
    no_dc_blocker: bool,

    /// Schmitt trigger hysteresis in sample units (0 disables)
    #[arg(long, default_value_t = 0)]
    schmitt_hysteresis: i32,

    /// Turbo 2000/Super Turbo: wrap every payload in a DOS binary
    #[arg(long)]
    save_as_binary: bool,

    /// Turbo 2000/Super Turbo: write the header to a sidecar file
    #[arg(long)]
    save_header: bool,

    /// Turbo ROM: decode the BASIC layout instead of binary
    #[arg(long)]
    turbo_rom_basic: bool,

    /// Lower-Silesian sub-protocol: autoturbo, ue, ue-protected, fc10
    #[arg(long, default_value = "autoturbo", value_parser = parse_ls_format)]
    lower_silesian_format: LowerSilesianFileFormat,

    /// KSO Turbo 2000: recording includes the system loader
    #[arg(long)]
    kso_with_loader: bool,
}

fn parse_format(s: &str) -> Result<TapeFormat, String> {
    TapeFormat::from_brief_name(s).ok_or_else(|| {
        format!(
            "unknown format '{s}', expected one of: {}",
            TapeFormat::ALL
                .iter()
                .map(|f| f.brief_name())
                .collect::<Vec<_>>()
                .join(", ")
        )
    })
}

fn parse_ls_format(s: &str) -> Result<LowerSilesianFileFormat, String> {
    match s {
        "autoturbo" => Ok(LowerSilesianFileFormat::AutoTurbo),
        "ue" => Ok(LowerSilesianFileFormat::UnknownExterminatorUnprotected),
        "ue-protected" => Ok(LowerSilesianFileFormat::UnknownExterminatorProtected),
        "fc10" => Ok(LowerSilesianFileFormat::FunnyCopy10Protected),
        _ => Err(format!(
            "unknown Lower-Silesian format '{s}', expected autoturbo, ue, ue-protected or fc10"
        )),
    }
}

impl DecodeOpts {
    fn build_config(&self, monitor_all_bytes: bool) -> DecoderConfig {
        DecoderConfig {
            tolerate_bad_checksum: self.tolerate_bad_checksum,
            prefer_adaptive_speed_detection: self.adaptive,
            prepend_sample_number: !self.no_sample_prefix,
            verbose: self.verbose,
            monitor_save_all_bytes: monitor_all_bytes,
            cs_turbo_save_header_to_extra_file: self.save_header,
            cs_turbo_always_save_as_binary: self.save_as_binary,
            turbo_rom_file_format: if self.turbo_rom_basic {
                TurboRomFileFormat::Basic
            } else {
                TurboRomFileFormat::Binary
            },
            lower_silesian_file_format: self.lower_silesian_format,
            kso_file_format: if self.kso_with_loader {
                KsoFileFormat::WithLoader
            } else {
                KsoFileFormat::Natural
            },
            dsp_block_dc_offset: !self.no_dc_blocker,
            dsp_schmitt_hysteresis: self.schmitt_hysteresis,
        }
    }
}

/// Routes decoder messages to the log facade.
struct ConsoleLog;

impl DecoderLog for ConsoleLog {
    fn add_message(&mut self, msg: DecoderMessage) {
        match msg.severity {
            Severity::Info | Severity::Save => log::info!("{}", msg.rendered()),
            Severity::Warning => log::warn!("{}", msg.rendered()),
            Severity::Error => log::error!("{}", msg.rendered()),
            Severity::Detail => log::debug!("{}", msg.rendered()),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode {
            input,
            channel,
            opts,
        } => {
            let config = opts.build_config(false);
            let source = WavSampleSource::open(&input, channel, &config)?;
            log::info!(
                "Scanning {} ({} samples at {} Hz) as {}",
                input.display(),
                source.total_samples(),
                source.sample_rate(),
                opts.format.display_name()
            );
            run_scan(source, opts.format, config, opts.out_dir, false);
        }

        Commands::Listen { opts } => {
            let config = opts.build_config(false);
            let source = CaptureSampleSource::open(&config)?;
            log::info!(
                "Listening on the default input device as {} (press Enter to stop)",
                opts.format.display_name()
            );

            // Cooperative stop from a second thread, observed at the next
            // sample read.
            let stop = source.stop_flag().clone();
            std::thread::spawn(move || {
                let mut line = String::new();
                let _ = std::io::stdin().lock().read_line(&mut line);
                stop.request_stop(false);
            });

            run_scan(source, opts.format, config, opts.out_dir, false);
        }

        Commands::Monitor {
            input,
            channel,
            all_bytes,
            opts,
        } => {
            let config = opts.build_config(all_bytes);
            let source = WavSampleSource::open(&input, channel, &config)?;
            run_scan(source, opts.format, config, opts.out_dir, true);
        }

        Commands::Formats => {
            println!("Supported tape formats:");
            for f in TapeFormat::ALL {
                println!("  {:10} {}", f.brief_name(), f.display_name());
            }
        }
    }

    Ok(())
}

fn run_scan<S: SampleSource>(
    source: S,
    format: TapeFormat,
    config: DecoderConfig,
    out_dir: PathBuf,
    monitor: bool,
) {
    let mut log = ConsoleLog;
    let mut writer = DiskWriter;
    let mut session = DecodeSession::new(
        PulseTimer::new(source),
        config,
        out_dir,
        &mut log,
        &mut writer,
    );

    if monitor {
        while file::monitor::decode_file(format, &mut session) == ScanControl::Continue {}
    } else {
        file::scan(format, &mut session);
    }

    log::info!("Scan finished at sample {}", session.timer.position());
}
