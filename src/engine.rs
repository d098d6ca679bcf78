// Whole-buffer patch API.
//
// Ties the codec, differ, RLE pass, applier and merger together for
// callers that already hold everything in memory:
//   - `diff_bytes`  : two same-sized buffers -> encoded patch
//   - `patch_bytes` : target + encoded patch -> patched copy
//   - `merge_bytes` : encoded patches (+ optional target) -> encoded patch

use std::io::Cursor;

use crate::apply::{self, ApplyError};
use crate::diff::{self, DiffError, DiffOptions};
use crate::ips::reader::{self, FormatError, ReadOptions, ReadWarning};
use crate::ips::writer;
use crate::merge::{self, MergeError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("format error: {0}")]
    Format(#[from] FormatError),
    #[error("diff error: {0}")]
    Diff(#[from] DiffError),
    #[error("apply error: {0}")]
    Apply(#[from] ApplyError),
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Patched copy of a target.
#[derive(Debug, Clone)]
pub struct Patched {
    pub data: Vec<u8>,
    pub records_applied: usize,
    pub warnings: Vec<ReadWarning>,
}

/// Encoded patch plus the diagnostics gathered while building it.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub patch: Vec<u8>,
    pub records: usize,
    pub warnings: Vec<ReadWarning>,
}

// ---------------------------------------------------------------------------
// High-level operations
// ---------------------------------------------------------------------------

/// Diff `source` against `target` and encode the patch.
pub fn diff_bytes(source: &[u8], target: &[u8], opts: DiffOptions) -> Result<Encoded, EngineError> {
    if source.len() != target.len() {
        return Err(DiffError::SizeMismatch {
            source_len: source.len() as u64,
            target_len: target.len() as u64,
        }
        .into());
    }
    let records = diff::diff_with_options(source, target, opts)?;
    let mut patch = Vec::with_capacity(writer::encoded_size(&records) as usize);
    writer::write_patch(&mut patch, &records)?;
    Ok(Encoded {
        patch,
        records: records.len(),
        warnings: Vec::new(),
    })
}

/// Apply an encoded patch to a copy of `target`.
pub fn patch_bytes(target: &[u8], patch: &[u8], opts: ReadOptions) -> Result<Patched, EngineError> {
    let read = reader::read_patch(Cursor::new(patch), opts)?;
    let mut sink = Cursor::new(target.to_vec());
    let records_applied = apply::apply(&mut sink, &read.records)?;
    Ok(Patched {
        data: sink.into_inner(),
        records_applied,
        warnings: read.warnings,
    })
}

/// Merge encoded patches in order; clean up against `target` if given.
pub fn merge_bytes(patches: &[&[u8]], target: Option<&[u8]>) -> Result<Encoded, EngineError> {
    let merged = merge::merge_with_target(patches.iter().map(|p| Cursor::new(*p)), target)?;
    let mut patch = Vec::with_capacity(writer::encoded_size(&merged.records) as usize);
    writer::write_patch(&mut patch, &merged.records)?;
    Ok(Encoded {
        patch,
        records: merged.records.len(),
        warnings: merged.warnings,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
