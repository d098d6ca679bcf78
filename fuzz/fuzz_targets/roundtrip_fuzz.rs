#![no_main]
use std::io::Cursor;

use ipsy::diff::DiffOptions;
use ipsy::engine;
use ipsy::ips::ReadOptions;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte selects RLE; the rest is split into two equal halves.
    let rle = data[0] & 1 != 0;
    let payload = &data[1..];
    let half = payload.len() / 2;
    let (source, target) = (&payload[..half], &payload[half..half * 2]);

    let encoded = engine::diff_bytes(source, target, DiffOptions { rle }).unwrap();
    let patched = engine::patch_bytes(source, &encoded.patch, ReadOptions::default()).unwrap();
    assert_eq!(patched.data, target);
    assert!(patched.warnings.is_empty());

    // Reading back with continuation gives the same records.
    let plain =
        ipsy::ips::read_patch(Cursor::new(&encoded.patch), ReadOptions::default()).unwrap();
    let cont =
        ipsy::ips::read_patch(Cursor::new(&encoded.patch), ReadOptions::continuing()).unwrap();
    assert_eq!(plain.records, cont.records);
});
