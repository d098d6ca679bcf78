// Patch merging and cleanup.
//
// `merge` concatenates the records of several patches in application order.
// Nothing is deduplicated; overlaps resolve the way the applier resolves
// them, later records win.
//
// `cleanup` re-derives an equivalent, usually smaller, record list for a
// known target: the merged records are replayed onto a scratch copy of the
// target, the copy is diffed against the untouched image and the result is
// RLE-compressed. The scratch image is bounded by the 16 MiB format limit.

use std::io::{Cursor, Read, Seek};

use crate::apply::{self, ApplyError};
use crate::diff::{self, DiffError};
use crate::ips::reader::{self, FormatError, PatchRead, ReadOptions};
use crate::ips::record::{EOF_OFFSET, MAX_UNPATCHED, Record};
use crate::rle;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("patch {index}: {source}")]
    Format {
        index: usize,
        #[source]
        source: FormatError,
    },
    #[error("merged patch spans {len} bytes, more than the {max}-byte limit", max = MAX_UNPATCHED)]
    ImageTooLarge { len: u64 },
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error(transparent)]
    Diff(#[from] DiffError),
}

// ---------------------------------------------------------------------------
// Scratch image
// ---------------------------------------------------------------------------

/// Pre- and post-image of a target, at most MAX_UNPATCHED bytes.
#[derive(Debug, Clone)]
pub struct ScratchImage {
    before: Vec<u8>,
    after: Vec<u8>,
}

impl ScratchImage {
    /// Copy `target` into an image of `len` bytes, zero-filled past the end
    /// of the target.
    pub fn new(target: &[u8], len: u64) -> Result<Self, MergeError> {
        let len = len.max(target.len() as u64);
        if len > MAX_UNPATCHED {
            return Err(MergeError::ImageTooLarge { len });
        }
        let mut before = vec![0u8; len as usize];
        before[..target.len()].copy_from_slice(target);
        let after = before.clone();
        Ok(Self { before, after })
    }

    pub fn len(&self) -> usize {
        self.before.len()
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty()
    }

    /// Replay records onto the post-image.
    pub fn apply(&mut self, records: &[Record]) -> Result<usize, ApplyError> {
        let mut sink = Cursor::new(self.after.as_mut_slice());
        apply::apply(&mut sink, records)
    }

    /// Literal records turning the pre-image into the post-image.
    pub fn diff(&self) -> Result<Vec<Record>, DiffError> {
        diff::diff_slices(&self.before, &self.after)
    }

    pub fn before(&self) -> &[u8] {
        &self.before
    }

    pub fn after(&self) -> &[u8] {
        &self.after
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Read each patch with terminator continuation and concatenate the records.
pub fn merge<I, R>(patches: I) -> Result<PatchRead, MergeError>
where
    I: IntoIterator<Item = R>,
    R: Read + Seek,
{
    let mut merged = PatchRead::default();
    let mut count = 0;
    for (index, patch) in patches.into_iter().enumerate() {
        let read = reader::read_patch(patch, ReadOptions::continuing())
            .map_err(|source| MergeError::Format { index, source })?;
        merged.records.extend(read.records);
        merged.warnings.extend(read.warnings);
        count += 1;
    }
    log::debug!(
        "merged {count} patches into {} records",
        merged.records.len()
    );
    Ok(merged)
}

/// Minimal equivalent record list for `records` applied to `target`.
pub fn cleanup(records: Vec<Record>, target: &[u8]) -> Result<Vec<Record>, MergeError> {
    let touched = records.iter().map(Record::end).max().unwrap_or(0);
    let mut image = ScratchImage::new(target, touched)?;
    image.apply(&records)?;
    let mut cleaned = image.diff()?;

    // Keep the file growth the original records caused.
    let len = image.len();
    if len > target.len() && cleaned.last().is_none_or(|r| r.end() < len as u64) {
        let mut start = len - 1;
        if start as u32 == EOF_OFFSET {
            start -= 1;
        }
        let tail = Record::new_literal(start as u32, image.after()[start..].to_vec());
        log::debug!("cleanup: keeping growth to {len} bytes with {tail}");
        cleaned.push(tail);
    }

    let cleaned = rle::compress(cleaned);
    log::debug!(
        "cleanup: {} records -> {} records",
        records.len(),
        cleaned.len()
    );
    Ok(cleaned)
}

/// Merge, then clean up against `target` when one is given.
pub fn merge_with_target<I, R>(patches: I, target: Option<&[u8]>) -> Result<PatchRead, MergeError>
where
    I: IntoIterator<Item = R>,
    R: Read + Seek,
{
    let mut merged = merge(patches)?;
    if let Some(target) = target {
        merged.records = cleanup(merged.records, target)?;
    }
    Ok(merged)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ips::writer::write_patch;

    fn encode(records: &[Record]) -> Vec<u8> {
        let mut out = Vec::new();
        write_patch(&mut out, records).unwrap();
        out
    }

    fn applied(target: &[u8], records: &[Record]) -> Vec<u8> {
        let mut sink = Cursor::new(target.to_vec());
        apply::apply(&mut sink, records).unwrap();
        sink.into_inner()
    }

    #[test]
    fn naive_merge_keeps_order() {
        let a = encode(&[Record::literal(0, vec![1]).unwrap()]);
        let b = encode(&[Record::literal(0, vec![2]).unwrap()]);
        let merged = merge([Cursor::new(a), Cursor::new(b)]).unwrap();
        assert_eq!(merged.records.len(), 2);
        assert_eq!(applied(&[0u8; 4], &merged.records)[0], 2);
    }

    #[test]
    fn merge_reports_failing_patch() {
        let good = encode(&[Record::literal(0, vec![1]).unwrap()]);
        let bad = b"NOPE".to_vec();
        let err = merge([Cursor::new(good), Cursor::new(bad)]).unwrap_err();
        assert!(matches!(
            err,
            MergeError::Format {
                index: 1,
                source: FormatError::MissingHeader
            }
        ));
    }

    #[test]
    fn cleanup_collapses_overwrites() {
        let target = vec![0u8; 32];
        let records = vec![
            Record::literal(0, vec![1; 8]).unwrap(),
            Record::literal(2, vec![2; 8]).unwrap(),
            Record::literal(20, vec![0; 4]).unwrap(),
        ];
        let cleaned = cleanup(records.clone(), &target).unwrap();
        assert_eq!(applied(&target, &cleaned), applied(&target, &records));
        // The write of zeros over zeros disappears; the rest is two runs.
        assert_eq!(
            cleaned,
            vec![
                Record::literal(0, vec![1, 1]).unwrap(),
                Record::run(2, 8, 2).unwrap()
            ]
        );
    }

    #[test]
    fn cleanup_keeps_file_growth() {
        let target = vec![5u8; 4];
        let records = vec![Record::literal(6, vec![0, 0]).unwrap()];
        let cleaned = cleanup(records.clone(), &target).unwrap();
        assert_eq!(applied(&target, &cleaned), applied(&target, &records));
        assert_eq!(cleaned, vec![Record::literal(7, vec![0]).unwrap()]);
    }

    #[test]
    fn growth_tail_moves_off_trailer_offset() {
        let target = vec![0u8; EOF_OFFSET as usize - 3];
        let records = vec![Record::literal(EOF_OFFSET, vec![0]).unwrap()];
        let cleaned = cleanup(records.clone(), &target).unwrap();
        assert_eq!(
            cleaned,
            vec![Record::literal(EOF_OFFSET - 1, vec![0, 0]).unwrap()]
        );
        assert_eq!(applied(&target, &cleaned), applied(&target, &records));
    }

    #[test]
    fn cleanup_of_nothing_is_empty() {
        assert!(cleanup(Vec::new(), b"abc").unwrap().is_empty());
    }

    #[test]
    fn scratch_image_is_bounded() {
        assert!(matches!(
            ScratchImage::new(&[], MAX_UNPATCHED + 1),
            Err(MergeError::ImageTooLarge { .. })
        ));
        let image = ScratchImage::new(b"ab", 4).unwrap();
        assert_eq!(image.before(), b"ab\0\0");
        assert_eq!(image.len(), 4);
    }

    #[test]
    fn merge_with_target_cleans_up() {
        let a = encode(&[Record::literal(0, vec![1, 1, 1, 1, 1]).unwrap()]);
        let b = encode(&[Record::literal(0, vec![2]).unwrap()]);
        let target = [0u8; 8];
        let merged = merge_with_target([Cursor::new(a), Cursor::new(b)], Some(&target)).unwrap();
        assert_eq!(
            merged.records,
            vec![
                Record::literal(0, vec![2]).unwrap(),
                Record::run(1, 4, 1).unwrap()
            ]
        );
    }
}
