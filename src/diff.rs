// Positional byte differ.
//
// Compares two equal-length streams byte for byte and emits literal records
// for every differing range, in increasing offset order:
//   - A record opens on the first mismatch and closes on the next match,
//     at end of input, or when it reaches MAX_RECORD_SIZE
//   - A record that would start at 0x454F46 ("EOF") is widened one byte
//     backward, using the preceding target byte
//
// Both inputs are streamed; nothing is seeked or buffered beyond the
// current chunk and the open record.

use std::io::{self, Read};

use crate::ips::reader::read_up_to;
use crate::ips::record::{self, EOF_OFFSET, MAX_RECORD_SIZE, Record};
use crate::rle;

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Differ configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// Run the RLE compressor over the result.
    pub rle: bool,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("inputs differ in length: source {source_len} bytes, target {target_len} bytes")]
    SizeMismatch { source_len: u64, target_len: u64 },
    #[error("difference at byte {offset} is beyond the 24-bit offset range")]
    TooLarge { offset: u64 },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Differ
// ---------------------------------------------------------------------------

/// Incremental differ. Feed equal-length chunks, then `finish`.
#[derive(Debug, Default)]
pub struct Differ {
    records: Vec<Record>,
    /// Absolute position of the next byte to be compared.
    pos: u64,
    /// Target bytes of the open record.
    pending: Vec<u8>,
    pending_start: u64,
    /// Target byte just before the open record (for widening).
    lead: Option<u8>,
    /// Last target byte seen.
    prev: Option<u8>,
}

impl Differ {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes compared so far.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Compare the next chunk of both inputs. Chunks must be equal length.
    pub fn update(&mut self, source: &[u8], target: &[u8]) -> Result<(), DiffError> {
        if source.len() != target.len() {
            return Err(DiffError::SizeMismatch {
                source_len: self.pos + source.len() as u64,
                target_len: self.pos + target.len() as u64,
            });
        }

        let mut i = 0;
        while i < source.len() {
            if self.pending.is_empty() {
                // Skip the matching stretch in one go.
                let same = source[i..]
                    .iter()
                    .zip(&target[i..])
                    .position(|(s, d)| s != d)
                    .unwrap_or(source.len() - i);
                if same > 0 {
                    i += same;
                    self.pos += same as u64;
                    self.prev = Some(target[i - 1]);
                    continue;
                }
                self.pending_start = self.pos;
                self.lead = self.prev;
            }

            let (s, d) = (source[i], target[i]);
            if s == d {
                self.close()?;
            } else {
                self.pending.push(d);
                if self.pending.len() == MAX_RECORD_SIZE {
                    self.close()?;
                }
            }
            self.prev = Some(d);
            self.pos += 1;
            i += 1;
        }
        Ok(())
    }

    /// Close any open record and return all records in offset order.
    pub fn finish(mut self) -> Result<Vec<Record>, DiffError> {
        self.close()?;
        if self.records.is_empty() {
            log::info!("no differences found");
        } else {
            log::debug!(
                "diff: {} records over {} bytes",
                self.records.len(),
                self.pos
            );
        }
        Ok(self.records)
    }

    fn close(&mut self) -> Result<(), DiffError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let data = std::mem::take(&mut self.pending);
        let start = self.pending_start;
        let offset =
            record::offset_from(start).map_err(|_| DiffError::TooLarge { offset: start })?;

        if offset != EOF_OFFSET {
            self.records.push(Record::new_literal(offset, data));
            return Ok(());
        }

        // Shift off the trailer value by pulling in the preceding byte.
        debug_assert!(self.lead.is_some());
        let lead = self.lead.unwrap_or_default();
        log::debug!("widening record at {EOF_OFFSET:#08x} one byte backward");
        if data.len() < MAX_RECORD_SIZE {
            let mut widened = Vec::with_capacity(data.len() + 1);
            widened.push(lead);
            widened.extend_from_slice(&data);
            self.records.push(Record::new_literal(offset - 1, widened));
        } else {
            // Full record: split so neither piece starts on the trailer.
            self.records
                .push(Record::new_literal(offset - 1, vec![lead, data[0]]));
            self.records
                .push(Record::new_literal(offset + 1, data[1..].to_vec()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stream diff
// ---------------------------------------------------------------------------

/// Diff two equal-length streams into literal records.
///
/// Callers are expected to check lengths first; a length mismatch found
/// while streaming is still reported as `SizeMismatch`.
pub fn diff<S: Read, T: Read>(mut source: S, mut target: T) -> Result<Vec<Record>, DiffError> {
    let mut differ = Differ::new();
    let mut src_buf = vec![0u8; BUF_SIZE];
    let mut dst_buf = vec![0u8; BUF_SIZE];

    loop {
        let n_src = read_up_to(&mut source, &mut src_buf)?;
        let n_dst = read_up_to(&mut target, &mut dst_buf)?;
        if n_src != n_dst {
            let base = differ.position();
            let source_len = base + n_src as u64 + io::copy(&mut source, &mut io::sink())?;
            let target_len = base + n_dst as u64 + io::copy(&mut target, &mut io::sink())?;
            return Err(DiffError::SizeMismatch {
                source_len,
                target_len,
            });
        }
        if n_src == 0 {
            break;
        }
        differ.update(&src_buf[..n_src], &dst_buf[..n_dst])?;
    }

    differ.finish()
}

/// Diff, then optionally RLE-compress.
pub fn diff_with_options<S: Read, T: Read>(
    source: S,
    target: T,
    opts: DiffOptions,
) -> Result<Vec<Record>, DiffError> {
    let records = diff(source, target)?;
    Ok(if opts.rle {
        rle::compress(records)
    } else {
        records
    })
}

/// Diff two in-memory buffers of equal length.
pub fn diff_slices(source: &[u8], target: &[u8]) -> Result<Vec<Record>, DiffError> {
    if source.len() != target.len() {
        return Err(DiffError::SizeMismatch {
            source_len: source.len() as u64,
            target_len: target.len() as u64,
        });
    }
    let mut differ = Differ::new();
    differ.update(source, target)?;
    differ.finish()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
