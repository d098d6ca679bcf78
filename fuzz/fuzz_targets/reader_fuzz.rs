#![no_main]
use std::io::Cursor;

use ipsy::ips::{self, ReadOptions};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The reader must never panic, only return errors or warnings.
    let _ = ips::read_patch(Cursor::new(data), ReadOptions::default());
    let _ = ips::read_patch(Cursor::new(data), ReadOptions::continuing());

    // Same input behind a valid header.
    let mut patch = b"PATCH".to_vec();
    patch.extend_from_slice(data);
    if let Ok(read) = ips::read_patch(Cursor::new(&patch), ReadOptions::continuing()) {
        let mut out = Vec::new();
        ips::write_patch(&mut out, &read.records).unwrap();
        assert_eq!(out.len() as u64, ips::encoded_size(&read.records));
    }
});
