//! Logging collaborator interface.
//!
//! The engine reports every header/segment decode and every file outcome
//! through this trait; `impulse` is a liveness tick with no text so a shell
//! can show progress during long silent scans.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
    Warning,
    Detail,
    Save,
}

#[derive(Debug, Clone)]
pub struct DecoderMessage {
    pub prefix: &'static str,
    pub text: String,
    pub severity: Severity,
}

impl DecoderMessage {
    pub fn new(prefix: &'static str, text: impl Into<String>, severity: Severity) -> Self {
        DecoderMessage {
            prefix,
            text: text.into(),
            severity,
        }
    }

    pub fn rendered(&self) -> String {
        format!("[{}] {}", self.prefix, self.text)
    }
}

pub trait DecoderLog {
    fn add_message(&mut self, msg: DecoderMessage);

    /// Liveness signal; no new text.
    fn impulse(&mut self) {}
}

/// Sink that discards everything. Useful in tests and for monitor runs that
/// only need the output files.
#[derive(Debug, Default)]
pub struct NullLog;

impl DecoderLog for NullLog {
    fn add_message(&mut self, _msg: DecoderMessage) {}
}

/// Log that collects messages in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct MemoryLog {
    pub messages: Vec<DecoderMessage>,
    pub impulses: usize,
}

impl DecoderLog for MemoryLog {
    fn add_message(&mut self, msg: DecoderMessage) {
        self.messages.push(msg);
    }

    fn impulse(&mut self) {
        self.impulses += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_rendering_includes_prefix() {
        let m = DecoderMessage::new("T2000", "HEADER: DEMO", Severity::Info);
        assert_eq!(m.rendered(), "[T2000] HEADER: DEMO");
    }

    #[test]
    fn memory_log_collects() {
        let mut log = MemoryLog::default();
        log.add_message(DecoderMessage::new("X", "a", Severity::Detail));
        log.impulse();
        log.impulse();
        assert_eq!(log.messages.len(), 1);
        assert_eq!(log.impulses, 2);
    }
}
