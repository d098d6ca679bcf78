// IPS patch format implementation.
//
// This module provides bit-exact reading and writing of IPS patch files,
// including the run-length record extension.
//
// # Modules
//
// - `record`: Record model and format constants
// - `reader`: Patch parsing with terminator continuation and diagnostics
// - `writer`: Patch emission

pub mod reader;
pub mod record;
pub mod writer;

// Re-export key types for convenience.
pub use reader::{FormatError, PatchRead, ReadOptions, ReadWarning, read_patch};
pub use record::{
    EOF_OFFSET, HEADER, MAX_RECORD_SIZE, MAX_UNPATCHED, MIN_COMPRESS, MIN_PATCH, MIN_RECORD,
    Payload, Record, RecordError, TRAILER,
};
pub use writer::{encoded_size, write_patch};
