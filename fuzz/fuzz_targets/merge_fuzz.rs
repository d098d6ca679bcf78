#![no_main]
use std::io::Cursor;

use ipsy::apply;
use ipsy::ips::{self, ReadOptions};
use ipsy::merge;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    // Two patch bodies and a small target carved out of the input.
    let a_len = data[0] as usize % (data.len() - 1);
    let rest = &data[1..];
    let (a, rest) = rest.split_at(a_len.min(rest.len()));
    let (b, target) = rest.split_at(rest.len() / 2);

    let patches: Vec<Vec<u8>> = [a, b]
        .iter()
        .map(|body| [&b"PATCH"[..], *body, &b"EOF"[..]].concat())
        .collect();

    let Ok(naive) = merge::merge(patches.iter().map(Cursor::new)) else {
        return;
    };
    // Keep the scratch image small.
    if naive.records.iter().any(|r| r.end() > 1 << 16) {
        return;
    }

    let cleaned = merge::cleanup(naive.records.clone(), target).unwrap();

    let mut expected = Cursor::new(target.to_vec());
    apply::apply(&mut expected, &naive.records).unwrap();
    let mut actual = Cursor::new(target.to_vec());
    apply::apply(&mut actual, &cleaned).unwrap();
    assert_eq!(actual.into_inner(), expected.into_inner());

    let mut out = Vec::new();
    ips::write_patch(&mut out, &cleaned).unwrap();
    let back = ips::read_patch(Cursor::new(&out), ReadOptions::default()).unwrap();
    assert_eq!(back.records, cleaned);
});
