// IPS patch emission.
//
// Layout: "PATCH", then per record a 3-byte big-endian offset and a 2-byte
// big-endian size followed by the literal bytes, or for RLE records a zero
// size, a 2-byte big-endian run length and the run byte. Ends with "EOF".

use std::io::{self, Write};

use super::record::{HEADER, Payload, Record, TRAILER};

impl Record {
    /// Encode this record to a writer.
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        if self.collides_with_trailer() {
            log::warn!(
                "record at {:#08x} encodes its offset as \"EOF\"; readers need terminator continuation",
                self.offset()
            );
        }
        let off = self.offset().to_be_bytes();
        w.write_all(&off[1..])?;
        match self.payload() {
            Payload::Literal(data) => {
                w.write_all(&(data.len() as u16).to_be_bytes())?;
                w.write_all(data)?;
            }
            Payload::Run { len, byte } => {
                w.write_all(&0u16.to_be_bytes())?;
                w.write_all(&len.to_be_bytes())?;
                w.write_all(&[*byte])?;
            }
        }
        Ok(())
    }
}

/// Write a complete patch (header, records in order, trailer).
pub fn write_patch<W: Write>(w: &mut W, records: &[Record]) -> io::Result<()> {
    w.write_all(HEADER)?;
    for record in records {
        log::trace!("write {record}");
        record.encode(w)?;
    }
    w.write_all(TRAILER)?;
    log::debug!("wrote patch: {} records", records.len());
    Ok(())
}

/// Size in bytes of the patch `write_patch` would produce.
pub fn encoded_size(records: &[Record]) -> u64 {
    let body: u64 = records.iter().map(|r| r.encoded_len() as u64).sum();
    HEADER.len() as u64 + body + TRAILER.len() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
