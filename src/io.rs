// File-level helpers for diffing, patching and merging.
//
// These are the caller-side checks and plumbing around the core:
//   - size preconditions (equal sizes for diff, MIN_PATCH, MAX_UNPATCHED)
//   - copy-before-patch, so the original file is never modified
//   - buffered I/O and summary stats
//
// With the `file-io` feature, SHA-256 digests of the inputs and the patched
// output are computed as the data streams through.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::apply::{self, ApplyError};
use crate::diff::{self, DiffError, DiffOptions};
use crate::ips::reader::{self, FormatError, ReadOptions, ReadWarning};
use crate::ips::record::{MAX_UNPATCHED, MIN_PATCH};
use crate::ips::writer;
use crate::merge::{self, MergeError};

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Options for `patch_file`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchOptions {
    pub read: ReadOptions,
}

/// Options for `merge_files`.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// File the patches are meant for; enables cleanup.
    pub target: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `diff_file()`.
#[derive(Debug, Clone)]
pub struct DiffStats {
    /// Size of each input in bytes.
    pub input_size: u64,
    /// Patch output size in bytes.
    pub patch_size: u64,
    /// Records written.
    pub records: usize,
    /// SHA-256 of the unpatched file (if `file-io` feature is enabled).
    pub unpatched_sha256: Option<[u8; 32]>,
    /// SHA-256 of the patched file (if `file-io` feature is enabled).
    pub patched_sha256: Option<[u8; 32]>,
}

/// Statistics returned by `patch_file()`.
#[derive(Debug, Clone)]
pub struct PatchStats {
    pub target_size: u64,
    pub patch_size: u64,
    pub output_size: u64,
    pub records_applied: usize,
    pub warnings: Vec<ReadWarning>,
    /// SHA-256 of the patched output (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

/// Statistics returned by `merge_files()`.
#[derive(Debug, Clone)]
pub struct MergeStats {
    pub patches: usize,
    pub records: usize,
    pub patch_size: u64,
    pub cleaned_up: bool,
    pub warnings: Vec<ReadWarning>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for file operations.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("format error: {0}")]
    Format(#[from] FormatError),
    #[error("diff error: {0}")]
    Diff(#[from] DiffError),
    #[error("apply error: {0}")]
    Apply(#[from] ApplyError),
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),
    #[error("the two files differ in size ({unpatched} vs {patched} bytes)")]
    SizeMismatch { unpatched: u64, patched: u64 },
    #[error("patch {} is too small to be valid ({size} bytes, minimum {min})", path.display(), min = MIN_PATCH)]
    PatchTooSmall { path: PathBuf, size: u64 },
    #[error("{} is {size} bytes; IPS can only address {max} bytes", path.display(), max = MAX_UNPATCHED)]
    TargetTooLarge { path: PathBuf, size: u64 },
    #[error("refusing to patch {} in place", path.display())]
    SameFile { path: PathBuf },
    #[error("no patches to merge")]
    NotEnoughPatches,
}

// ---------------------------------------------------------------------------
// diff_file
// ---------------------------------------------------------------------------

/// Diff two same-sized files and write the patch to `patch_path`.
pub fn diff_file(
    unpatched_path: &Path,
    patched_path: &Path,
    patch_path: &Path,
    opts: DiffOptions,
) -> Result<DiffStats, IoError> {
    let unpatched = File::open(unpatched_path)?;
    let patched = File::open(patched_path)?;
    let size = unpatched.metadata()?.len();
    let patched_size = patched.metadata()?.len();
    if size != patched_size {
        return Err(IoError::SizeMismatch {
            unpatched: size,
            patched: patched_size,
        });
    }
    check_target_size(unpatched_path, size)?;

    let mut src = HashingReader::new(BufReader::with_capacity(BUF_SIZE, unpatched));
    let mut dst = HashingReader::new(BufReader::with_capacity(BUF_SIZE, patched));
    let records = diff::diff_with_options(&mut src, &mut dst, opts)?;

    let out = File::create(patch_path)?;
    let mut writer = BufWriter::with_capacity(BUF_SIZE, out);
    writer::write_patch(&mut writer, &records)?;
    let patch_size = writer
        .into_inner()
        .map_err(|e| e.into_error())?
        .metadata()?
        .len();

    Ok(DiffStats {
        input_size: size,
        patch_size,
        records: records.len(),
        unpatched_sha256: src.finish(),
        patched_sha256: dst.finish(),
    })
}

// ---------------------------------------------------------------------------
// patch_file
// ---------------------------------------------------------------------------

/// Copy `target_path` to `output_path` and apply the patch to the copy.
pub fn patch_file(
    target_path: &Path,
    patch_path: &Path,
    output_path: &Path,
    opts: PatchOptions,
) -> Result<PatchStats, IoError> {
    let patch_size = check_patch_size(patch_path)?;
    let target_size = fs::metadata(target_path)?.len();
    check_target_size(target_path, target_size)?;
    if output_path.exists() && fs::canonicalize(output_path)? == fs::canonicalize(target_path)? {
        return Err(IoError::SameFile {
            path: output_path.to_path_buf(),
        });
    }

    // Parse fully before touching the output.
    let patch = BufReader::with_capacity(BUF_SIZE, File::open(patch_path)?);
    let read = reader::read_patch(patch, opts.read)?;

    fs::copy(target_path, output_path)?;
    let out = OpenOptions::new().read(true).write(true).open(output_path)?;
    let mut sink = BufWriter::with_capacity(BUF_SIZE, out);
    let records_applied = apply::apply(&mut sink, &read.records)?;
    let out = sink.into_inner().map_err(|e| e.into_error())?;
    let output_size = out.metadata()?.len();
    drop(out);

    Ok(PatchStats {
        target_size,
        patch_size,
        output_size,
        records_applied,
        warnings: read.warnings,
        output_sha256: sha256_file(output_path)?,
    })
}

// ---------------------------------------------------------------------------
// merge_files
// ---------------------------------------------------------------------------

/// Merge patches in order into `output_path`.
pub fn merge_files(
    patch_paths: &[PathBuf],
    output_path: &Path,
    opts: &MergeOptions,
) -> Result<MergeStats, IoError> {
    if patch_paths.is_empty() {
        return Err(IoError::NotEnoughPatches);
    }
    let mut inputs = Vec::with_capacity(patch_paths.len());
    for path in patch_paths {
        check_patch_size(path)?;
        inputs.push(BufReader::with_capacity(BUF_SIZE, File::open(path)?));
    }

    let target = match &opts.target {
        Some(path) => {
            check_target_size(path, fs::metadata(path)?.len())?;
            Some(fs::read(path)?)
        }
        None => None,
    };

    let merged = merge::merge_with_target(inputs, target.as_deref())?;

    let out = File::create(output_path)?;
    let mut writer = BufWriter::with_capacity(BUF_SIZE, out);
    writer::write_patch(&mut writer, &merged.records)?;
    writer.flush()?;

    Ok(MergeStats {
        patches: patch_paths.len(),
        records: merged.records.len(),
        patch_size: writer::encoded_size(&merged.records),
        cleaned_up: target.is_some(),
        warnings: merged.warnings,
    })
}

// ---------------------------------------------------------------------------
// Output naming
// ---------------------------------------------------------------------------

/// `dir/rom.sfc` -> `rom_patched.sfc`.
pub fn default_output_name(target: &Path) -> PathBuf {
    let mut name = target.file_stem().map(OsString::from).unwrap_or_default();
    name.push("_patched");
    if let Some(ext) = target.extension() {
        name.push(".");
        name.push(ext);
    }
    PathBuf::from(name)
}

/// `dir/rom.sfc` -> `patch_rom.ips`.
pub fn default_patch_name(target: &Path) -> PathBuf {
    let mut name = OsString::from("patch_");
    if let Some(stem) = target.file_stem() {
        name.push(stem);
    }
    name.push(".ips");
    PathBuf::from(name)
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

fn check_patch_size(path: &Path) -> Result<u64, IoError> {
    let size = fs::metadata(path)?.len();
    if size < MIN_PATCH {
        return Err(IoError::PatchTooSmall {
            path: path.to_path_buf(),
            size,
        });
    }
    Ok(size)
}

fn check_target_size(path: &Path, size: u64) -> Result<(), IoError> {
    if size > MAX_UNPATCHED {
        return Err(IoError::TargetTooLarge {
            path: path.to_path_buf(),
            size,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Hashing reader (digest only with file-io feature)
// ---------------------------------------------------------------------------

struct HashingReader<R: Read> {
    inner: R,
    #[cfg(feature = "file-io")]
    hasher: sha2::Sha256,
}

impl<R: Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            #[cfg(feature = "file-io")]
            hasher: sha2::Sha256::new(),
        }
    }

    #[cfg(feature = "file-io")]
    fn finish(self) -> Option<[u8; 32]> {
        Some(self.hasher.finalize().into())
    }

    #[cfg(not(feature = "file-io"))]
    fn finish(self) -> Option<[u8; 32]> {
        None
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        #[cfg(feature = "file-io")]
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

fn sha256_file(path: &Path) -> io::Result<Option<[u8; 32]>> {
    if !cfg!(feature = "file-io") {
        return Ok(None);
    }
    let mut reader = HashingReader::new(BufReader::with_capacity(BUF_SIZE, File::open(path)?));
    io::copy(&mut reader, &mut io::sink())?;
    Ok(reader.finish())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
