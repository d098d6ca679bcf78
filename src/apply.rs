// Patch application.
//
// Replays records onto a seekable sink in sequence order, so later records
// win where spans overlap. The sink is modified in place and there is no
// rollback: on error, records before the failing one stay applied.

use std::io::{self, Seek, SeekFrom, Write};

use crate::ips::record::{Payload, Record};

/// Largest chunk written at once when expanding an RLE record.
const RUN_CHUNK: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("applying record {index} at offset {offset:#08x}: {source}")]
    Io {
        index: usize,
        offset: u32,
        #[source]
        source: io::Error,
    },
}

/// Apply records to `sink`. Returns the number of records applied.
pub fn apply<W: Write + Seek + ?Sized>(
    sink: &mut W,
    records: &[Record],
) -> Result<usize, ApplyError> {
    for (index, record) in records.iter().enumerate() {
        log::trace!("apply {record}");
        apply_record(sink, record).map_err(|source| ApplyError::Io {
            index,
            offset: record.offset(),
            source,
        })?;
    }
    log::debug!("applied {} records", records.len());
    Ok(records.len())
}

/// Apply one record.
pub fn apply_record<W: Write + Seek + ?Sized>(sink: &mut W, record: &Record) -> io::Result<()> {
    sink.seek(SeekFrom::Start(record.offset() as u64))?;
    match record.payload() {
        Payload::Literal(data) => sink.write_all(data),
        Payload::Run { len, byte } => {
            let chunk = [*byte; RUN_CHUNK];
            let mut left = *len as usize;
            while left > 0 {
                let n = left.min(RUN_CHUNK);
                sink.write_all(&chunk[..n])?;
                left -= n;
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
