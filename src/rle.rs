// RLE compression pass.
//
// Splits literal records around runs of at least MIN_COMPRESS identical
// bytes:
//   - Runs of MIN_COMPRESS or more become RLE records
//   - Everything between runs stays literal, at its original offset
//   - RLE records and records without a qualifying run pass through
//
// The set of bytes written and their offsets never change. A split point
// that would land on offset 0x454F46 ("EOF") is moved by carving a 2-byte
// literal around it.

use crate::ips::record::{EOF_OFFSET, MAX_UNPATCHED, MIN_COMPRESS, Payload, Record};

/// One piece of a literal record, relative to the record start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    start: usize,
    len: usize,
    run: bool,
}

impl Segment {
    fn end(&self) -> usize {
        self.start + self.len
    }
}

/// RLE-compress a record sequence. Order is preserved.
pub fn compress(records: Vec<Record>) -> Vec<Record> {
    let before = records.len();
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        compress_record_into(record, &mut out);
    }
    log::debug!("rle: {before} records -> {}", out.len());
    out
}

/// RLE-compress a single record into one or more records.
pub fn compress_record(record: Record) -> Vec<Record> {
    let mut out = Vec::new();
    compress_record_into(record, &mut out);
    out
}

fn compress_record_into(record: Record, out: &mut Vec<Record>) {
    // Sub-record offsets past the 24-bit field cannot be written.
    let splittable = record.end() <= MAX_UNPATCHED;
    let base = record.offset();
    let data = match record.into_payload() {
        Payload::Literal(data) if splittable && data.len() >= MIN_COMPRESS => data,
        payload => {
            out.push(Record::from_payload(base, payload));
            return;
        }
    };

    let mut segments = segment(&data);
    if !segments.iter().any(|s| s.run) {
        out.push(Record::new_literal(base, data));
        return;
    }

    avoid_trailer_split(&mut segments, base);

    for seg in segments {
        let offset = base + seg.start as u32;
        if seg.run {
            out.push(Record::new_run(offset, seg.len as u16, data[seg.start]));
        } else {
            out.push(Record::new_literal(
                offset,
                data[seg.start..seg.end()].to_vec(),
            ));
        }
    }
}

/// Split data into maximal qualifying runs and the literal stretches
/// between them.
fn segment(data: &[u8]) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        let len = data[i..].iter().take_while(|&&b| b == byte).count();
        push_segment(
            &mut segments,
            Segment {
                start: i,
                len,
                run: len >= MIN_COMPRESS,
            },
        );
        i += len;
    }
    segments
}

/// Append, merging adjacent literal segments.
fn push_segment(segments: &mut Vec<Segment>, seg: Segment) {
    if seg.len == 0 {
        return;
    }
    if let Some(last) = segments.last_mut() {
        if !last.run && !seg.run {
            last.len += seg.len;
            return;
        }
    }
    segments.push(seg);
}

/// Move any interior split point off the trailer offset.
///
/// The bytes on either side of the split are pulled into a 2-byte literal;
/// runs left shorter than MIN_COMPRESS become literal.
fn avoid_trailer_split(segments: &mut Vec<Segment>, base: u32) {
    if base >= EOF_OFFSET {
        return;
    }
    let split = (EOF_OFFSET - base) as usize;
    let Some(idx) = segments.iter().position(|s| s.start == split) else {
        return;
    };
    if idx == 0 {
        return;
    }

    let (prev, next) = (segments[idx - 1], segments[idx]);
    let pieces = [
        Segment {
            start: prev.start,
            len: prev.len - 1,
            run: prev.run,
        },
        Segment {
            start: split - 1,
            len: 2,
            run: false,
        },
        Segment {
            start: split + 1,
            len: next.len - 1,
            run: next.run,
        },
    ];

    let mut rebuilt = Vec::with_capacity(segments.len() + 1);
    for &seg in &segments[..idx - 1] {
        push_segment(&mut rebuilt, seg);
    }
    for mut seg in pieces {
        if seg.len < MIN_COMPRESS {
            seg.run = false;
        }
        push_segment(&mut rebuilt, seg);
    }
    for &seg in &segments[idx + 1..] {
        push_segment(&mut rebuilt, seg);
    }
    log::debug!("rle: moved split off {EOF_OFFSET:#08x}");
    *segments = rebuilt;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
