// IPS record model and format constants.
//
// A record is one offset plus either a literal byte string or a single byte
// repeated `len` times (the RLE extension). Records are immutable values;
// every transform in the crate builds new ones.

use std::fmt;
use std::ops::Range;

// ---------------------------------------------------------------------------
// Format constants
// ---------------------------------------------------------------------------

/// Patch file header.
pub const HEADER: &[u8; 5] = b"PATCH";
/// Patch file trailer.
pub const TRAILER: &[u8; 3] = b"EOF";

pub const OFFSET_SIZE: usize = 3;
pub const SIZE_SIZE: usize = 2;
pub const RLE_DATA_SIZE: usize = 1;

/// The record offset whose 3-byte encoding is the trailer ("EOF").
pub const EOF_OFFSET: u32 = 0x45_4F_46;
/// Largest offset the 3-byte field can carry.
pub const MAX_OFFSET: u32 = (1 << 24) - 1;
/// Largest target the format can address (16 MiB).
pub const MAX_UNPATCHED: u64 = 1 << 24;
/// Largest literal payload (2-byte size field, 0 is reserved for RLE).
pub const MAX_RECORD_SIZE: usize = 0xFFFF;

/// Smallest complete record: offset + size + 1 byte of payload.
pub const MIN_RECORD: usize = OFFSET_SIZE + SIZE_SIZE + 1;
/// Smallest complete patch: header + one minimal record + trailer.
pub const MIN_PATCH: u64 = (HEADER.len() + MIN_RECORD + TRAILER.len()) as u64;
/// Shortest run worth turning into an RLE record.
pub const MIN_COMPRESS: usize = 4;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A record that would violate the on-disk field ranges.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("offset {0:#x} does not fit the 24-bit offset field")]
    OffsetOutOfRange(u64),
    #[error("literal record at {offset:#08x} has no data")]
    EmptyLiteral { offset: u32 },
    #[error("literal record at {offset:#08x} is {len} bytes (max {max})", max = MAX_RECORD_SIZE)]
    LiteralTooLong { offset: u32, len: usize },
    #[error("run record at {offset:#08x} has zero length")]
    EmptyRun { offset: u32 },
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Payload of a record: literal bytes or one repeated byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Literal(Vec<u8>),
    Run { len: u16, byte: u8 },
}

/// One IPS record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    offset: u32,
    payload: Payload,
}

impl Record {
    /// Build a literal record, checking the field ranges.
    pub fn literal(offset: u32, data: Vec<u8>) -> Result<Self, RecordError> {
        check_offset(offset)?;
        if data.is_empty() {
            return Err(RecordError::EmptyLiteral { offset });
        }
        if data.len() > MAX_RECORD_SIZE {
            return Err(RecordError::LiteralTooLong {
                offset,
                len: data.len(),
            });
        }
        Ok(Self::new_literal(offset, data))
    }

    /// Build a run-length record, checking the field ranges.
    pub fn run(offset: u32, len: u16, byte: u8) -> Result<Self, RecordError> {
        check_offset(offset)?;
        if len == 0 {
            return Err(RecordError::EmptyRun { offset });
        }
        Ok(Self::new_run(offset, len, byte))
    }

    /// Internal constructor for callers that already hold the invariants.
    pub(crate) fn new_literal(offset: u32, data: Vec<u8>) -> Self {
        debug_assert!(offset <= MAX_OFFSET);
        debug_assert!(!data.is_empty() && data.len() <= MAX_RECORD_SIZE);
        Self {
            offset,
            payload: Payload::Literal(data),
        }
    }

    pub(crate) fn new_run(offset: u32, len: u16, byte: u8) -> Self {
        debug_assert!(offset <= MAX_OFFSET);
        debug_assert!(len != 0);
        Self {
            offset,
            payload: Payload::Run { len, byte },
        }
    }

    pub(crate) fn from_payload(offset: u32, payload: Payload) -> Self {
        Self { offset, payload }
    }

    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Value of the on-disk size field: literal length, or 0 for RLE.
    #[inline]
    pub fn size(&self) -> usize {
        match &self.payload {
            Payload::Literal(data) => data.len(),
            Payload::Run { .. } => 0,
        }
    }

    /// Value of the on-disk RLE length field, or 0 for literals.
    #[inline]
    pub fn rle_len(&self) -> usize {
        match self.payload {
            Payload::Literal(_) => 0,
            Payload::Run { len, .. } => len as usize,
        }
    }

    #[inline]
    pub fn is_rle(&self) -> bool {
        matches!(self.payload, Payload::Run { .. })
    }

    /// Number of target bytes this record writes.
    #[inline]
    pub fn len(&self) -> usize {
        self.size() + self.rle_len()
    }

    /// Always false; a valid record writes at least one byte.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One past the last target byte written.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset as u64 + self.len() as u64
    }

    /// Target byte range this record writes.
    #[inline]
    pub fn span(&self) -> Range<u64> {
        self.offset as u64..self.end()
    }

    /// Whether the offset encodes to the trailer bytes.
    #[inline]
    pub fn collides_with_trailer(&self) -> bool {
        self.offset == EOF_OFFSET
    }

    /// Bytes this record occupies in a patch file.
    pub fn encoded_len(&self) -> usize {
        match &self.payload {
            Payload::Literal(data) => OFFSET_SIZE + SIZE_SIZE + data.len(),
            Payload::Run { .. } => OFFSET_SIZE + SIZE_SIZE + SIZE_SIZE + RLE_DATA_SIZE,
        }
    }

    /// Literal form covering the same span with the same bytes.
    pub fn inflate(&self) -> Record {
        match self.payload {
            Payload::Literal(_) => self.clone(),
            Payload::Run { len, byte } => Self::new_literal(self.offset, vec![byte; len as usize]),
        }
    }

    /// The bytes this record writes, expanded.
    pub fn data(&self) -> Vec<u8> {
        match &self.payload {
            Payload::Literal(data) => data.clone(),
            Payload::Run { len, byte } => vec![*byte; *len as usize],
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Literal(data) => {
                write!(f, "{:06X} LIT  len={}", self.offset, data.len())
            }
            Payload::Run { len, byte } => {
                write!(f, "{:06X} RLE  len={len} byte={byte:02X}", self.offset)
            }
        }
    }
}

fn check_offset(offset: u32) -> Result<(), RecordError> {
    if offset > MAX_OFFSET {
        return Err(RecordError::OffsetOutOfRange(offset as u64));
    }
    Ok(())
}

/// Convert an absolute target position to a record offset.
pub(crate) fn offset_from(pos: u64) -> Result<u32, RecordError> {
    if pos > MAX_OFFSET as u64 {
        return Err(RecordError::OffsetOutOfRange(pos));
    }
    Ok(pos as u32)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_format() {
        assert_eq!(MIN_RECORD, 6);
        assert_eq!(MIN_PATCH, 14);
        assert_eq!(MAX_UNPATCHED, 16 * 1024 * 1024);
        assert_eq!(&EOF_OFFSET.to_be_bytes()[1..], TRAILER);
    }

    #[test]
    fn literal_fields() {
        let r = Record::literal(4, vec![0xAA, 0xBB]).unwrap();
        assert_eq!(r.offset(), 4);
        assert_eq!(r.size(), 2);
        assert_eq!(r.rle_len(), 0);
        assert_eq!(r.span(), 4..6);
        assert_eq!(r.encoded_len(), 7);
        assert!(!r.is_rle());
    }

    #[test]
    fn run_fields() {
        let r = Record::run(10, 300, 0x7F).unwrap();
        assert_eq!(r.size(), 0);
        assert_eq!(r.rle_len(), 300);
        assert_eq!(r.end(), 310);
        assert_eq!(r.encoded_len(), 8);
        assert!(r.is_rle());
    }

    #[test]
    fn inflate_keeps_coverage() {
        let r = Record::run(2, 5, 0x11).unwrap();
        let lit = r.inflate();
        assert_eq!(lit.offset(), 2);
        assert_eq!(lit.data(), vec![0x11; 5]);
        assert_eq!(lit.span(), r.span());
        assert_eq!(lit.inflate(), lit);
    }

    #[test]
    fn constructors_reject_bad_fields() {
        assert_eq!(
            Record::literal(0, Vec::new()),
            Err(RecordError::EmptyLiteral { offset: 0 })
        );
        assert!(matches!(
            Record::literal(0, vec![0; MAX_RECORD_SIZE + 1]),
            Err(RecordError::LiteralTooLong { len: 65536, .. })
        ));
        assert_eq!(
            Record::run(7, 0, 1),
            Err(RecordError::EmptyRun { offset: 7 })
        );
        assert!(matches!(
            Record::run(1 << 24, 1, 1),
            Err(RecordError::OffsetOutOfRange(_))
        ));
        assert!(Record::literal(MAX_OFFSET, vec![0; MAX_RECORD_SIZE]).is_ok());
    }

    #[test]
    fn trailer_collision_is_detected() {
        let r = Record::literal(EOF_OFFSET, vec![1]).unwrap();
        assert!(r.collides_with_trailer());
        assert!(!Record::literal(EOF_OFFSET - 1, vec![1]).unwrap().collides_with_trailer());
    }

    #[test]
    fn display_is_one_line() {
        let r = Record::run(0x454F45, 4, 0xFF).unwrap();
        assert_eq!(r.to_string(), "454F45 RLE  len=4 byte=FF");
        let r = Record::literal(4, vec![1, 2]).unwrap();
        assert_eq!(r.to_string(), "000004 LIT  len=2");
    }
}
