//! Shared result taxonomy for pulse, block and file decoding.
//!
//! Outcomes are deliberately not modelled as errors: a failed pilot search or
//! a bad checksum is a normal event during a tape scan and the scanning loop
//! decides whether to retry, skip the file, or stop.

use crate::logging::Severity;
use std::fmt;

/// Code describing how a pulse measurement or block decode ended.
///
/// The first group is stream-level and always aborts the entire scan. The
/// second group is physical and aborts only the current block or file
/// attempt. The checksum codes exist only at block granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    EndOfStream,
    IoError,
    Cancelled,
    PulseTooLong,
    AmbiguousBit,
    UnexpectedPulseWidth,
    BadFileFormat,
    /// Checksum mismatch tolerated by configuration; data still usable.
    ChecksumWarning,
    /// Checksum mismatch, block rejected.
    ChecksumBad,
    BlockTooShort,
}

impl Outcome {
    /// Stream-level outcomes abort the whole scan immediately.
    pub fn is_stream_fatal(self) -> bool {
        matches!(
            self,
            Outcome::EndOfStream | Outcome::IoError | Outcome::Cancelled
        )
    }

    /// Physical or logical damage local to one block attempt.
    pub fn is_physical_error(self) -> bool {
        matches!(
            self,
            Outcome::PulseTooLong
                | Outcome::AmbiguousBit
                | Outcome::UnexpectedPulseWidth
                | Outcome::BlockTooShort
                | Outcome::ChecksumBad
        )
    }

    /// Block usable (perfect, or checksum mismatch tolerated).
    pub fn is_accepted(self) -> bool {
        matches!(self, Outcome::Ok | Outcome::ChecksumWarning)
    }

    /// Block decoded with a matching checksum.
    pub fn is_perfect(self) -> bool {
        self == Outcome::Ok
    }

    pub fn severity(self) -> Severity {
        if self.is_perfect() {
            Severity::Info
        } else if self.is_accepted() {
            Severity::Warning
        } else {
            Severity::Error
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Outcome::Ok => "OK: Success",
            Outcome::EndOfStream => "EOF: End of stream reached",
            Outcome::IoError => "ERROR: I/O Error",
            Outcome::Cancelled => "BREAK: User break",
            Outcome::PulseTooLong => "ERROR: No pulse found",
            Outcome::AmbiguousBit => "ERROR: Not one, not zero",
            Outcome::UnexpectedPulseWidth => "ERROR: Unexpected pulse width",
            Outcome::BadFileFormat => "ERROR: Bad file format",
            Outcome::ChecksumWarning => "WARNING: Bad checksum",
            Outcome::ChecksumBad => "ERROR: Bad checksum",
            Outcome::BlockTooShort => "ERROR: Block too short",
        };
        f.write_str(text)
    }
}

/// Protocol sub-variant detected by an adaptive block decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeterminedTurbo {
    SuperTurbo,
    Turbo2000,
}

/// Result of one block decode attempt.
///
/// `bytes` may be partial; `valid_bytes` counts the bytes fully decoded
/// before the failure. Immutable once produced.
#[derive(Debug, Clone)]
pub struct BlockDecodeResult {
    pub bytes: Vec<u8>,
    pub valid_bytes: usize,
    pub outcome: Outcome,
    /// Stream position (samples) at the point of success or failure.
    pub position: u64,
    pub aux: Option<DeterminedTurbo>,
}

impl BlockDecodeResult {
    pub fn new(bytes: Vec<u8>, valid_bytes: usize, outcome: Outcome, position: u64) -> Self {
        BlockDecodeResult {
            bytes,
            valid_bytes,
            outcome,
            position,
            aux: None,
        }
    }

    pub fn with_aux(mut self, aux: DeterminedTurbo) -> Self {
        self.aux = Some(aux);
        self
    }

    /// Outcome text with the stream position appended, for log messages.
    pub fn describe(&self) -> String {
        format!("{} {{{}}}", self.outcome, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_fatal_codes() {
        assert!(Outcome::EndOfStream.is_stream_fatal());
        assert!(Outcome::IoError.is_stream_fatal());
        assert!(Outcome::Cancelled.is_stream_fatal());
        assert!(!Outcome::PulseTooLong.is_stream_fatal());
        assert!(!Outcome::ChecksumBad.is_stream_fatal());
    }

    #[test]
    fn physical_error_codes() {
        for c in [
            Outcome::PulseTooLong,
            Outcome::AmbiguousBit,
            Outcome::UnexpectedPulseWidth,
            Outcome::BlockTooShort,
            Outcome::ChecksumBad,
        ] {
            assert!(c.is_physical_error());
            assert!(!c.is_accepted());
        }
        assert!(!Outcome::EndOfStream.is_physical_error());
    }

    #[test]
    fn checksum_warning_is_accepted_but_not_perfect() {
        assert!(Outcome::ChecksumWarning.is_accepted());
        assert!(!Outcome::ChecksumWarning.is_perfect());
        assert_eq!(Outcome::ChecksumWarning.severity(), Severity::Warning);
        assert_eq!(Outcome::Ok.severity(), Severity::Info);
        assert_eq!(Outcome::ChecksumBad.severity(), Severity::Error);
    }
}
