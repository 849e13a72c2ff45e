//! Per-run decoder configuration.

/// Output layout variant recorded by Turbo ROM tapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurboRomFileFormat {
    #[default]
    Binary,
    Basic,
}

/// Sub-protocols of the Lower-Silesian Turbo 2000 family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LowerSilesianFileFormat {
    #[default]
    AutoTurbo,
    UnknownExterminatorUnprotected,
    UnknownExterminatorProtected,
    FunnyCopy10Protected,
}

/// Tape layout conventions used by KSO Turbo 2000 recordings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KsoFileFormat {
    #[default]
    Natural,
    WithLoader,
}

/// Process-wide configuration for one decode session. Created once per run,
/// read-only afterwards by every decoder.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Accept blocks whose checksum does not match, flagging a warning.
    pub tolerate_bad_checksum: bool,
    /// Derive pulse-width thresholds from the first observed pilot pulses
    /// instead of the fixed per-protocol constants.
    pub prefer_adaptive_speed_detection: bool,
    /// Prefix output file names with the zero-padded absolute sample number.
    pub prepend_sample_number: bool,
    /// Emit detail messages for pilot/sync/bit-level events.
    pub verbose: bool,

    /// Turbo monitor: keep framing bytes instead of trimming to the payload.
    pub monitor_save_all_bytes: bool,

    /// Czech Turbo 2000 / Super Turbo: write the decoded header to a sidecar
    /// text file next to the output.
    pub cs_turbo_save_header_to_extra_file: bool,
    /// Czech Turbo 2000 / Super Turbo: wrap every payload in a DOS binary
    /// header regardless of the recorded file type.
    pub cs_turbo_always_save_as_binary: bool,

    pub turbo_rom_file_format: TurboRomFileFormat,
    pub lower_silesian_file_format: LowerSilesianFileFormat,
    pub kso_file_format: KsoFileFormat,

    /// Run the DC blocking filter in front of the level threshold.
    pub dsp_block_dc_offset: bool,
    /// Schmitt trigger hysteresis in sample units; 0 disables it.
    pub dsp_schmitt_hysteresis: i32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            tolerate_bad_checksum: false,
            prefer_adaptive_speed_detection: false,
            prepend_sample_number: true,
            verbose: true,
            monitor_save_all_bytes: false,
            cs_turbo_save_header_to_extra_file: false,
            cs_turbo_always_save_as_binary: false,
            turbo_rom_file_format: TurboRomFileFormat::default(),
            lower_silesian_file_format: LowerSilesianFileFormat::default(),
            kso_file_format: KsoFileFormat::default(),
            dsp_block_dc_offset: true,
            dsp_schmitt_hysteresis: 0,
        }
    }
}
