//! DOS 2 binary (XEX) analyzer.
//!
//! Walks the segment list of an Atari DOS 2 binary image. Used for two
//! queries only: "does this payload look like an executable" (output
//! extension disambiguation) and "does any segment cover this memory region"
//! (loader-compatibility pre-checks). Building monolithic binaries from the
//! segment list is out of scope.

use thiserror::Error;

/// RUN vector address range (transfer of control after load).
pub const RUN_VECTOR: (u16, u16) = (736, 737);
/// INIT vector address range (transfer of control during load).
pub const INIT_VECTOR: (u16, u16) = (738, 739);

#[derive(Debug, Error)]
pub enum Dos2Error {
    #[error("Binary file header not found. First two bytes do not have values of 255 [0xFF]")]
    MissingHeader,

    #[error("Negative segment size: first address {first} is above last address {last}")]
    NegativeSegmentSize { first: u16, last: u16 },

    #[error("Segment or segment header continues beyond end of binary file")]
    Truncated,

    #[error("Binary file has no segments")]
    Empty,
}

/// One load-address-tagged contiguous byte range.
#[derive(Debug, Clone)]
pub struct Segment {
    first_address: u16,
    data: Vec<u8>,
}

impl Segment {
    pub fn first_address(&self) -> u16 {
        self.first_address
    }

    pub fn last_address(&self) -> u16 {
        (self.first_address as u32 + self.data.len() as u32 - 1) as u16
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn covers(&self, address: u16) -> bool {
        (self.first_address..=self.last_address()).contains(&address)
    }

    /// Covers both bytes of the RUN vector.
    pub fn has_full_run_vector(&self) -> bool {
        self.covers(RUN_VECTOR.0) && self.covers(RUN_VECTOR.1)
    }

    /// Touches the INIT vector (possibly only one byte).
    pub fn has_init_vector(&self) -> bool {
        self.covers(INIT_VECTOR.0) || self.covers(INIT_VECTOR.1)
    }

    pub fn run_vector(&self) -> Option<u16> {
        if !self.has_full_run_vector() {
            return None;
        }
        let lo = self.data[(RUN_VECTOR.0 - self.first_address) as usize] as u16;
        let hi = self.data[(RUN_VECTOR.1 - self.first_address) as usize] as u16;
        Some(lo | hi << 8)
    }
}

/// Analyzed DOS 2 binary image.
#[derive(Debug, Clone)]
pub struct Dos2Binary {
    segments: Vec<Segment>,
}

impl Dos2Binary {
    /// Parse the segment list. With `header_required` the image must open
    /// with the 255/255 eyecatcher; otherwise the eyecatcher is optional.
    pub fn analyze(data: &[u8], header_required: bool) -> Result<Self, Dos2Error> {
        let mut pos = 0usize;

        if header_required {
            if data.len() < 2 || data[0] != 255 || data[1] != 255 {
                return Err(Dos2Error::MissingHeader);
            }
            pos = 2;
        } else if data.len() >= 2 && data[0] == 255 && data[1] == 255 {
            pos = 2;
        }

        let mut segments = Vec::new();

        while pos < data.len() {
            // A repeated 255/255 between segments is legal.
            if pos + 1 < data.len() && data[pos] == 255 && data[pos + 1] == 255 {
                pos += 2;
            }

            if pos + 4 > data.len() {
                return Err(Dos2Error::Truncated);
            }
            let first = data[pos] as u16 | (data[pos + 1] as u16) << 8;
            let last = data[pos + 2] as u16 | (data[pos + 3] as u16) << 8;
            pos += 4;

            if last < first {
                return Err(Dos2Error::NegativeSegmentSize { first, last });
            }

            let len = (last - first + 1) as usize;
            if pos + len > data.len() {
                return Err(Dos2Error::Truncated);
            }
            segments.push(Segment {
                first_address: first,
                data: data[pos..pos + len].to_vec(),
            });
            pos += len;
        }

        if segments.is_empty() {
            return Err(Dos2Error::Empty);
        }

        Ok(Dos2Binary { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn total_segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Does any segment overlap the given memory region?
    pub fn covers_memory(&self, first: u16, last: u16) -> bool {
        self.segments.iter().any(|s| {
            let below = s.first_address() < first && s.last_address() < first;
            let above = s.first_address() > last && s.last_address() > last;
            !below && !above
        })
    }

    pub fn has_init_vector(&self) -> bool {
        self.segments.iter().any(Segment::has_init_vector)
    }

    pub fn run_vector(&self) -> Option<u16> {
        self.segments.iter().filter_map(Segment::run_vector).last()
    }
}

/// Extension-disambiguation query: does the payload parse as a complete
/// headered DOS 2 binary?
pub fn looks_like_program_image(data: &[u8]) -> bool {
    Dos2Binary::analyze(data, true).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_binary() -> Vec<u8> {
        // FF FF, one data segment 0x2000-0x2003, one RUN vector segment.
        let mut b = vec![0xFF, 0xFF];
        b.extend_from_slice(&[0x00, 0x20, 0x03, 0x20]);
        b.extend_from_slice(&[1, 2, 3, 4]);
        b.extend_from_slice(&[0xE0, 0x02, 0xE1, 0x02]); // 736-737
        b.extend_from_slice(&[0x00, 0x20]);
        b
    }

    #[test]
    fn analyzes_segments_and_run_vector() {
        let bin = Dos2Binary::analyze(&simple_binary(), true).unwrap();
        assert_eq!(bin.total_segment_count(), 2);
        assert_eq!(bin.segments()[0].first_address(), 0x2000);
        assert_eq!(bin.segments()[0].last_address(), 0x2003);
        assert_eq!(bin.run_vector(), Some(0x2000));
        assert!(!bin.has_init_vector());
    }

    #[test]
    fn header_required_rejects_raw_data() {
        assert!(Dos2Binary::analyze(&[0x00, 0x20, 0x01, 0x20, 1, 2], true).is_err());
        assert!(Dos2Binary::analyze(&[0x00, 0x20, 0x01, 0x20, 1, 2], false).is_ok());
    }

    #[test]
    fn negative_segment_size_rejected() {
        let b = [0xFF, 0xFF, 0x10, 0x20, 0x00, 0x20, 0x00];
        assert!(matches!(
            Dos2Binary::analyze(&b, true),
            Err(Dos2Error::NegativeSegmentSize { .. })
        ));
    }

    #[test]
    fn truncated_segment_rejected() {
        let b = [0xFF, 0xFF, 0x00, 0x20, 0x10, 0x20, 1, 2];
        assert!(matches!(
            Dos2Binary::analyze(&b, true),
            Err(Dos2Error::Truncated)
        ));
    }

    #[test]
    fn repeated_eyecatcher_between_segments() {
        let mut b = vec![0xFF, 0xFF];
        b.extend_from_slice(&[0x00, 0x20, 0x00, 0x20, 0xAA]);
        b.extend_from_slice(&[0xFF, 0xFF]);
        b.extend_from_slice(&[0x01, 0x20, 0x01, 0x20, 0xBB]);
        let bin = Dos2Binary::analyze(&b, true).unwrap();
        assert_eq!(bin.total_segment_count(), 2);
    }

    #[test]
    fn covers_memory_detects_overlap() {
        let bin = Dos2Binary::analyze(&simple_binary(), true).unwrap();
        assert!(bin.covers_memory(0x2002, 0x2100));
        assert!(bin.covers_memory(0x1F00, 0x2000));
        assert!(!bin.covers_memory(0x3000, 0x3100));
        // The RUN vector segment covers 736..737.
        assert!(bin.covers_memory(700, 740));
    }

    #[test]
    fn looks_like_program_image_query() {
        assert!(looks_like_program_image(&simple_binary()));
        assert!(!looks_like_program_image(b"BASIC PROGRAM"));
        assert!(!looks_like_program_image(&[]));
    }
}
