// IPS patch parsing.
//
// Each record is read as one explicit step: a record, a skipped record with
// a warning, or the end of the patch. Fatal problems abort the read and no
// partial record list is returned; warnings are collected and logged.
//
// The trailer "EOF" is also a legal 3-byte offset (0x454F46). With
// `continue_past_eof` the reader peeks past an apparent trailer and only
// stops if less than one minimal record remains; otherwise it rewinds and
// parses the trailer bytes as an offset. Naively concatenated patches need
// this.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use super::record::{
    EOF_OFFSET, HEADER, MIN_RECORD, OFFSET_SIZE, RLE_DATA_SIZE, Record, SIZE_SIZE, TRAILER,
};

// ---------------------------------------------------------------------------
// Options, errors, warnings
// ---------------------------------------------------------------------------

/// Reader configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Treat "EOF" as a record offset unless it really ends the stream.
    pub continue_past_eof: bool,
}

impl ReadOptions {
    pub fn continuing() -> Self {
        Self {
            continue_past_eof: true,
        }
    }
}

/// Record field that was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Offset,
    Size,
    RleLength,
    RleByte,
    Data,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Offset => "offset",
            Self::Size => "size",
            Self::RleLength => "RLE length",
            Self::RleByte => "RLE byte",
            Self::Data => "data",
        })
    }
}

/// Fatal patch parsing error.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("patch is missing the \"PATCH\" header")]
    MissingHeader,
    #[error("patch ends inside the {field} of the record at byte {position}")]
    TruncatedRecord { position: u64, field: Field },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Non-fatal patch problem. The read continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadWarning {
    /// Record with both size and RLE length zero; skipped.
    AmbiguousRecord { offset: u32, position: u64 },
    /// Bytes after the trailer; discarded.
    TrailingData { bytes: u64 },
    /// Stream ended where a record offset or trailer should start.
    MissingTrailer,
}

impl fmt::Display for ReadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmbiguousRecord { offset, position } => write!(
                f,
                "record at byte {position} (offset {offset:#08x}) has zero size and zero RLE length; skipped"
            ),
            Self::TrailingData { bytes } => {
                write!(f, "{bytes} bytes after \"EOF\" trailer; discarded")
            }
            Self::MissingTrailer => f.write_str("patch has no \"EOF\" trailer"),
        }
    }
}

/// Records and diagnostics from one patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchRead {
    pub records: Vec<Record>,
    pub warnings: Vec<ReadWarning>,
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

enum Step {
    Record(Record),
    Skip(ReadWarning),
    Trailer,
    EndOfStream,
}

/// Record-at-a-time patch reader.
pub struct PatchReader<R> {
    inner: R,
    position: u64,
    opts: ReadOptions,
}

impl<R: Read + Seek> PatchReader<R> {
    /// Validate the header and position the reader at the first record.
    pub fn new(mut inner: R, opts: ReadOptions) -> Result<Self, FormatError> {
        let mut magic = [0u8; HEADER.len()];
        let n = read_up_to(&mut inner, &mut magic)?;
        if n != magic.len() || &magic != HEADER {
            return Err(FormatError::MissingHeader);
        }
        Ok(Self {
            inner,
            position: n as u64,
            opts,
        })
    }

    /// Read every remaining record.
    pub fn read_all(mut self) -> Result<PatchRead, FormatError> {
        let mut out = PatchRead::default();
        loop {
            match self.next_step()? {
                Step::Record(record) => {
                    log::trace!("read {record}");
                    out.records.push(record);
                }
                Step::Skip(warning) => {
                    log::warn!("{warning}");
                    out.warnings.push(warning);
                }
                Step::Trailer => {
                    let extra = self.drain()?;
                    if extra > 0 {
                        let warning = ReadWarning::TrailingData { bytes: extra };
                        log::warn!("{warning}");
                        out.warnings.push(warning);
                    }
                    break;
                }
                Step::EndOfStream => {
                    log::warn!("{}", ReadWarning::MissingTrailer);
                    out.warnings.push(ReadWarning::MissingTrailer);
                    break;
                }
            }
        }
        log::debug!(
            "read patch: {} records, {} warnings",
            out.records.len(),
            out.warnings.len()
        );
        Ok(out)
    }

    fn next_step(&mut self) -> Result<Step, FormatError> {
        let start = self.position;

        let mut off = [0u8; OFFSET_SIZE];
        let n = self.fill(&mut off)?;
        if n == 0 {
            return Ok(Step::EndOfStream);
        }
        if n < OFFSET_SIZE {
            return Err(truncated(start, Field::Offset));
        }

        if &off == TRAILER {
            if !self.opts.continue_past_eof || !self.record_follows()? {
                return Ok(Step::Trailer);
            }
            log::debug!("\"EOF\" at byte {start} is followed by more records; continuing");
        }
        let offset = u32::from_be_bytes([0, off[0], off[1], off[2]]);
        debug_assert!(offset != EOF_OFFSET || self.opts.continue_past_eof);

        let size = self.read_u16(start, Field::Size)?;
        if size != 0 {
            let mut data = vec![0u8; size as usize];
            if self.fill(&mut data)? != data.len() {
                return Err(truncated(start, Field::Data));
            }
            return Ok(Step::Record(Record::new_literal(offset, data)));
        }

        let len = self.read_u16(start, Field::RleLength)?;
        if len == 0 {
            return Ok(Step::Skip(ReadWarning::AmbiguousRecord {
                offset,
                position: start,
            }));
        }
        let mut byte = [0u8; RLE_DATA_SIZE];
        if self.fill(&mut byte)? != RLE_DATA_SIZE {
            return Err(truncated(start, Field::RleByte));
        }
        Ok(Step::Record(Record::new_run(offset, len, byte[0])))
    }

    /// Peek for a minimal record after an apparent trailer, then rewind.
    fn record_follows(&mut self) -> Result<bool, FormatError> {
        let mut peek = [0u8; MIN_RECORD];
        let n = self.fill(&mut peek)?;
        self.inner.seek(SeekFrom::Current(-(n as i64)))?;
        self.position -= n as u64;
        Ok(n == MIN_RECORD)
    }

    fn read_u16(&mut self, start: u64, field: Field) -> Result<u16, FormatError> {
        let mut buf = [0u8; SIZE_SIZE];
        if self.fill(&mut buf)? != SIZE_SIZE {
            return Err(truncated(start, field));
        }
        Ok(u16::from_be_bytes(buf))
    }

    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = read_up_to(&mut self.inner, buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn drain(&mut self) -> io::Result<u64> {
        let n = io::copy(&mut self.inner, &mut io::sink())?;
        self.position += n;
        Ok(n)
    }
}

fn truncated(position: u64, field: Field) -> FormatError {
    FormatError::TruncatedRecord { position, field }
}

/// Parse a complete patch.
pub fn read_patch<R: Read + Seek>(r: R, opts: ReadOptions) -> Result<PatchRead, FormatError> {
    PatchReader::new(r, opts)?.read_all()
}

/// Read until `buf` is full or the stream ends. Returns bytes read.
pub(crate) fn read_up_to<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read(bytes: &[u8], continue_past_eof: bool) -> Result<PatchRead, FormatError> {
        read_patch(Cursor::new(bytes), ReadOptions { continue_past_eof })
    }

    #[test]
    fn reads_literal_and_run() {
        let bytes = b"PATCH\x00\x00\x04\x00\x02\xAA\xBB\x00\x01\x00\x00\x00\x05\xFFEOF";
        let patch = read(bytes, false).unwrap();
        assert_eq!(
            patch.records,
            vec![
                Record::literal(4, vec![0xAA, 0xBB]).unwrap(),
                Record::run(0x100, 5, 0xFF).unwrap(),
            ]
        );
        assert!(patch.warnings.is_empty());
    }

    #[test]
    fn rejects_missing_header() {
        assert!(matches!(
            read(b"PATCX\x00\x00\x00\x00\x01\x01EOF", false),
            Err(FormatError::MissingHeader)
        ));
        assert!(matches!(read(b"PAT", false), Err(FormatError::MissingHeader)));
    }

    #[test]
    fn truncated_payload_is_fatal() {
        let err = read(b"PATCH\x00\x00\x04\x00\x04\xAA\xBB", false).unwrap_err();
        assert!(matches!(
            err,
            FormatError::TruncatedRecord {
                position: 5,
                field: Field::Data
            }
        ));
    }

    #[test]
    fn truncated_fields_are_fatal() {
        let cases: [(&[u8], Field); 4] = [
            (b"PATCH\x00\x00", Field::Offset),
            (b"PATCH\x00\x00\x01\x00", Field::Size),
            (b"PATCH\x00\x00\x01\x00\x00\x00", Field::RleLength),
            (b"PATCH\x00\x00\x01\x00\x00\x00\x03", Field::RleByte),
        ];
        for (bytes, expected) in cases {
            match read(bytes, false) {
                Err(FormatError::TruncatedRecord { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected truncation in {expected}, got {other:?}"),
            }
        }
    }

    #[test]
    fn ambiguous_record_is_skipped() {
        let bytes = b"PATCH\x00\x00\x01\x00\x00\x00\x00\x00\x00\x02\x00\x01\x42EOF";
        let patch = read(bytes, false).unwrap();
        assert_eq!(patch.records, vec![Record::literal(2, vec![0x42]).unwrap()]);
        assert_eq!(
            patch.warnings,
            vec![ReadWarning::AmbiguousRecord {
                offset: 1,
                position: 5
            }]
        );
    }

    #[test]
    fn trailing_data_is_reported() {
        let patch = read(b"PATCH\x00\x00\x01\x00\x01\x09EOFjunk", false).unwrap();
        assert_eq!(patch.records.len(), 1);
        assert_eq!(patch.warnings, vec![ReadWarning::TrailingData { bytes: 4 }]);
    }

    #[test]
    fn missing_trailer_is_a_warning() {
        let patch = read(b"PATCH\x00\x00\x01\x00\x01\x09", false).unwrap();
        assert_eq!(patch.records.len(), 1);
        assert_eq!(patch.warnings, vec![ReadWarning::MissingTrailer]);
    }

    #[test]
    fn eof_offset_stops_without_continuation() {
        // A record at 0x454F46 looks exactly like the trailer.
        let bytes = b"PATCH\x00\x00\x01\x00\x01\x09EOF\x00\x01\x07EOF";
        let patch = read(bytes, false).unwrap();
        assert_eq!(patch.records.len(), 1);
        assert_eq!(patch.warnings, vec![ReadWarning::TrailingData { bytes: 6 }]);
    }

    #[test]
    fn eof_offset_parsed_with_continuation() {
        let bytes = b"PATCH\x00\x00\x01\x00\x01\x09EOF\x00\x01\x07EOF";
        let patch = read(bytes, true).unwrap();
        assert_eq!(
            patch.records,
            vec![
                Record::literal(1, vec![0x09]).unwrap(),
                Record::literal(EOF_OFFSET, vec![0x07]).unwrap(),
            ]
        );
        assert!(patch.warnings.is_empty());
    }

    #[test]
    fn continuation_stops_at_short_tail() {
        // Five bytes after "EOF" cannot hold a record.
        let bytes = b"PATCH\x00\x00\x01\x00\x01\x09EOFabcde";
        let patch = read(bytes, true).unwrap();
        assert_eq!(patch.records.len(), 1);
        assert_eq!(patch.warnings, vec![ReadWarning::TrailingData { bytes: 5 }]);
    }

    #[test]
    fn continuation_reads_glued_patch_as_eof_record() {
        // A second patch body glued after "EOF" is indistinguishable from a
        // record at 0x454F46; the trailer bytes become its offset.
        let bytes = b"PATCH\x00\x00\x00\x00\x01\x01EOF\x00\x00\x00\x01\x02EOF";
        let patch = read(bytes, true).unwrap();
        assert_eq!(
            patch.records,
            vec![
                Record::literal(0, vec![0x01]).unwrap(),
                Record::run(EOF_OFFSET, 1, 0x02).unwrap(),
            ]
        );
    }

    #[test]
    fn warnings_display() {
        let w = ReadWarning::AmbiguousRecord {
            offset: 1,
            position: 5,
        };
        assert!(w.to_string().contains("zero size"));
        assert_eq!(
            ReadWarning::TrailingData { bytes: 3 }.to_string(),
            "3 bytes after \"EOF\" trailer; discarded"
        );
    }
}
