//! Per-protocol block decoders.
//!
//! Each decoder is a strategy struct holding only its rescaled pulse-width
//! thresholds and the session configuration. The pulse timer is passed into
//! every decode call, so decoders can be freely combined over one stream.
//!
//! The common skeleton is: lock onto a pilot tone, detect the sync pulse,
//! classify one pulse (or one falling-to-rising interval) per bit, verify the
//! checksum. An out-of-range pulse during pilot search restarts the search;
//! the owning file decoder decides what a failed block means.

pub mod ast;
pub mod blizzard;
pub mod kso;
pub mod lower_silesian;
pub mod superturbo;
pub mod turbo2000;
pub mod turborom;

pub use ast::AstBlockDecoder;
pub use blizzard::BlizzardBlockDecoder;
pub use kso::KsoBlockDecoder;
pub use lower_silesian::{LowerSilesianBlockDecoder, MangleMode};
pub use superturbo::SuperTurboBlockDecoder;
pub use turbo2000::Turbo2000BlockDecoder;
pub use turborom::TurboRomBlockDecoder;

use crate::logging::{DecoderLog, DecoderMessage, Severity};

pub(crate) fn detail(log: &mut dyn DecoderLog, prefix: &'static str, text: String) {
    log.add_message(DecoderMessage::new(prefix, text, Severity::Detail));
}
