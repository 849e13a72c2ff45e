//! Turbo Tape (and B-TAPE) file decoder.
//!
//! Turbo Tape records every block once or twice (single/double modes) with a
//! sequence number, so a damaged copy can be recovered from its duplicate.
//! The decoder runs a small state machine over block attempts: a successor
//! extends the file, an identical duplicate may replace an imperfect stored
//! copy, anything else is a fatal sequencing error. Garbled stretches are
//! retried until a wall-clock window of samples runs out.

use crate::block::SuperTurboBlockDecoder;
use crate::checksum::check_xor_block;
use crate::filename::{output_name, polished_name};
use crate::logging::Severity;
use crate::outcome::BlockDecodeResult;
use crate::pulse::SampleSource;

use super::{DecodeSession, ScanControl};

const PFX: &str = "TTAPE";

const BLOCK_LEN: usize = 1026;
const PAYLOAD_LEN: usize = 1008;
const NAME_LEN: usize = 12;

/// Seconds of unreadable signal tolerated before a file attempt is dropped.
const GARBLED_TIMEOUT_SECS: u64 = 15;

/// Tape recording modes. The single modes (LS 0, SS 128) record each block
/// once; every other mode (LD 64, SD 192) records each block twice.
pub(crate) mod tape_mode {
    pub const LS: u8 = 0;
    pub const SS: u8 = 128;
}

/// One parsed Turbo Tape block.
#[derive(Debug, Clone)]
pub(crate) struct TtBlock {
    pub sequence_number: u8,
    pub mode: u8,
    pub name: [u8; NAME_LEN],
    pub valid_bytes: usize,
    pub eof: bool,
    pub payload: Vec<u8>,
    pub perfect: bool,
}

impl TtBlock {
    pub fn parse(raw: &[u8]) -> Self {
        let mut name = [0u8; NAME_LEN];
        name[..8].copy_from_slice(&raw[6..14]);
        name[8] = b'.';
        name[9..12].copy_from_slice(&raw[14..17]);

        TtBlock {
            sequence_number: raw[0],
            mode: raw[1],
            name,
            valid_bytes: raw[2] as usize + ((raw[3] & 0x7F) as usize) * 256,
            eof: raw[3] & 0x80 != 0,
            payload: raw[17..17 + PAYLOAD_LEN].to_vec(),
            perfect: check_xor_block(raw),
        }
    }

    pub fn uses_duplicates(&self) -> bool {
        self.mode != tape_mode::LS && self.mode != tape_mode::SS
    }

    /// Blocks are equal iff sequence number, mode, valid-byte count, EOF
    /// flag, name and payload all match. The perfect flag is excluded: it is
    /// exactly what may differ between two recordings of the same block.
    pub fn is_same_block(&self, other: &TtBlock) -> bool {
        self.sequence_number == other.sequence_number
            && self.mode == other.mode
            && self.valid_bytes == other.valid_bytes
            && self.eof == other.eof
            && self.payload == other.payload
            && self.name == other.name
    }

    pub fn is_predecessor_of(&self, other: &TtBlock) -> bool {
        other.sequence_number.checked_sub(1) == Some(self.sequence_number)
            && self.mode == other.mode
            && self.name == other.name
    }

    pub fn title(&self) -> String {
        format!("{} ({})", String::from_utf8_lossy(&self.name), self.mode)
    }

    /// Payload bytes actually belonging to the file (the count field spans
    /// the 16 framing bytes before the payload).
    pub fn valid_data(&self) -> &[u8] {
        &self.payload[..self.valid_bytes.saturating_sub(16).min(PAYLOAD_LEN)]
    }
}

enum Attempt {
    Successor(TtBlock),
    Duplicate,
    BadSeq,
    Terminate(BlockDecodeResult),
    Garbled(BlockDecodeResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    P1,
    P2,
}

enum FileResult {
    Ok,
    Terminate(Option<BlockDecodeResult>),
    Garbled(Option<BlockDecodeResult>),
    BadSeq,
}

struct TurboTapeDecoder {
    decoder: SuperTurboBlockDecoder,
    stored_blocks: Vec<TtBlock>,
    first_file_sample: u64,
}

pub fn decode_file<S: SampleSource>(session: &mut DecodeSession<'_, S>) -> ScanControl {
    let mut ttd = TurboTapeDecoder {
        decoder: SuperTurboBlockDecoder::new(session.timer.sample_rate(), &session.config, 64),
        stored_blocks: Vec::new(),
        first_file_sample: 0,
    };
    ttd.run(session)
}

impl TurboTapeDecoder {
    fn run<S: SampleSource>(&mut self, session: &mut DecodeSession<'_, S>) -> ScanControl {
        loop {
            self.stored_blocks.clear();
            self.first_file_sample = session.timer.position();

            let bdr = self
                .decoder
                .decode_block(&mut session.timer, BLOCK_LEN, session.log);

            if bdr.outcome.is_stream_fatal() {
                session.message(PFX, bdr.describe(), bdr.outcome.severity());
                return ScanControl::Stop;
            }

            if !bdr.outcome.is_accepted() {
                continue;
            }

            let block = TtBlock::parse(&bdr.bytes);
            // A file starts with sequence number 1; anything else is tape
            // middle and scanning continues.
            if block.sequence_number != 1 {
                continue;
            }

            session.message(
                PFX,
                format!("HEADER: {} <{}>", block.title(), bdr.describe()),
                bdr.outcome.severity(),
            );

            let duplicates = block.uses_duplicates();
            let eof = block.eof;
            self.store(block);

            if eof {
                self.flush_file(session);
                return ScanControl::Continue;
            }

            match self.decode_blocks(session, duplicates) {
                FileResult::Ok => {
                    self.flush_file(session);
                    return ScanControl::Continue;
                }
                FileResult::Terminate(bdr) => {
                    if let Some(bdr) = bdr {
                        session.message(PFX, bdr.describe(), bdr.outcome.severity());
                    }
                    return ScanControl::Stop;
                }
                FileResult::Garbled(bdr) => {
                    if let Some(bdr) = bdr {
                        session.message(
                            PFX,
                            format!("FATAL ERROR: {}", bdr.describe()),
                            bdr.outcome.severity(),
                        );
                    }
                    return ScanControl::Continue;
                }
                FileResult::BadSeq => {
                    session.message(
                        PFX,
                        "FATAL ERROR: Incorrect sequence of blocks".to_string(),
                        Severity::Error,
                    );
                    return ScanControl::Continue;
                }
            }
        }
    }

    /// The recovery machine. Duplicates are only tolerated from P1, and only
    /// in double-block mode; after one duplicate in a row (P2) the next block
    /// must be a successor, forcing forward progress.
    fn decode_blocks<S: SampleSource>(
        &mut self,
        session: &mut DecodeSession<'_, S>,
        mode_d: bool,
    ) -> FileResult {
        let mut state = State::Start;

        loop {
            // Terminal success: the last accepted block closed the file.
            if state != State::Start && self.last_stored().eof {
                return FileResult::Ok;
            }

            let duplicate_accepted = match state {
                State::Start => false,
                State::P1 => mode_d,
                State::P2 => false,
            };

            match self.attempt_block(session, duplicate_accepted) {
                Attempt::Terminate(bdr) => return FileResult::Terminate(Some(bdr)),
                Attempt::Garbled(bdr) => return FileResult::Garbled(Some(bdr)),
                Attempt::BadSeq => return FileResult::BadSeq,
                Attempt::Duplicate => state = State::P2,
                Attempt::Successor(block) => {
                    self.store(block);
                    state = State::P1;
                }
            }
        }
    }

    /// Read one physical block and classify it against the last stored one.
    fn attempt_block<S: SampleSource>(
        &mut self,
        session: &mut DecodeSession<'_, S>,
        duplicate_accepted: bool,
    ) -> Attempt {
        let error_mark = session.timer.position();
        let garbled_window = GARBLED_TIMEOUT_SECS * session.timer.sample_rate() as u64;

        loop {
            let sequence_mark = session.timer.position();

            let bdr = self
                .decoder
                .decode_block(&mut session.timer, BLOCK_LEN, session.log);

            if bdr.outcome.is_stream_fatal() {
                return Attempt::Terminate(bdr);
            }

            if bdr.outcome.is_physical_error() {
                let distance = session.timer.position() - error_mark;
                if distance > garbled_window {
                    return Attempt::Garbled(bdr);
                }
                session.message(
                    PFX,
                    format!("PROBLEM: <{}>", bdr.describe()),
                    bdr.outcome.severity(),
                );
                continue;
            }

            let block = TtBlock::parse(&bdr.bytes);

            if self.last_stored().is_predecessor_of(&block) {
                if !bdr.outcome.is_perfect() {
                    session.message(
                        PFX,
                        format!(
                            "PROBLEM: <{}> BLOCK: {}",
                            bdr.describe(),
                            block.sequence_number
                        ),
                        bdr.outcome.severity(),
                    );
                }
                return Attempt::Successor(block);
            }

            if duplicate_accepted && self.last_stored().is_same_block(&block) {
                // The second copy replaces the first if only the second one
                // passed its checksum.
                if bdr.outcome.is_perfect() && !self.last_stored().perfect {
                    let seq = block.sequence_number;
                    self.replace_last_stored(block);
                    session.message(
                        PFX,
                        format!("RESTORE FROM DUPLICATE: BLOCK: {seq}"),
                        Severity::Warning,
                    );
                }
                return Attempt::Duplicate;
            }

            // Neither successor nor acceptable duplicate. Rewind so the next
            // file attempt sees this block again.
            if session.timer.is_seekable() {
                session.timer.seek(sequence_mark);
            }
            return Attempt::BadSeq;
        }
    }

    fn last_stored(&self) -> &TtBlock {
        self.stored_blocks.last().expect("at least the first block")
    }

    fn store(&mut self, block: TtBlock) {
        self.stored_blocks.push(block);
    }

    fn replace_last_stored(&mut self, block: TtBlock) {
        self.stored_blocks.pop();
        self.stored_blocks.push(block);
    }

    fn flush_file<S: SampleSource>(&mut self, session: &mut DecodeSession<'_, S>) {
        let file_data: Vec<u8> = self
            .stored_blocks
            .iter()
            .flat_map(|b| b.valid_data().iter().copied())
            .collect();

        let sample = session
            .config
            .prepend_sample_number
            .then_some(self.first_file_sample);
        let name = output_name(&polished_name(&self.last_stored().name), "", sample);

        if !session.save(PFX, &name, &file_data) {
            return;
        }

        if self.stored_blocks.iter().all(|b| b.perfect) {
            session.message(PFX, "SUCCESS: File decoded OK".to_string(), Severity::Info);
        } else {
            session.message(
                PFX,
                "WARNING: File decoded with problems".to_string(),
                Severity::Warning,
            );
        }
        session.message(PFX, format!("SAVE: {name}"), Severity::Save);
    }
}
