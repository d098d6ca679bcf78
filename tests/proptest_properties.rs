use std::io::Cursor;

use ipsy::apply;
use ipsy::diff;
use ipsy::ips::{self, EOF_OFFSET, MAX_RECORD_SIZE, ReadOptions, Record};
use ipsy::rle;
use proptest::prelude::*;

/// Literal and run records within a small address window.
fn record_strategy() -> impl Strategy<Value = Record> {
    prop_oneof![
        (0u32..4096, proptest::collection::vec(any::<u8>(), 1..64))
            .prop_map(|(offset, data)| Record::literal(offset, data).unwrap()),
        (0u32..4096, 1u16..512, any::<u8>())
            .prop_map(|(offset, len, byte)| Record::run(offset, len, byte).unwrap()),
    ]
}

/// Literal records with plenty of short and long runs inside.
fn runny_literal_strategy() -> impl Strategy<Value = Record> {
    (
        0u32..100_000,
        proptest::collection::vec((0u8..4, 1usize..10), 1..24),
    )
        .prop_map(|(offset, pieces)| {
            let data: Vec<u8> = pieces
                .into_iter()
                .flat_map(|(byte, n)| std::iter::repeat_n(byte, n))
                .collect();
            Record::literal(offset, data).unwrap()
        })
}

/// (offset, byte) pairs in application order.
fn writes(records: &[Record]) -> Vec<(u64, u8)> {
    records
        .iter()
        .flat_map(|r| {
            let start = r.offset() as u64;
            r.data()
                .into_iter()
                .enumerate()
                .map(move |(i, b)| (start + i as u64, b))
        })
        .collect()
}

fn encode(records: &[Record]) -> Vec<u8> {
    let mut out = Vec::new();
    ips::write_patch(&mut out, records).unwrap();
    out
}

fn apply_to(target: &[u8], records: &[Record]) -> Vec<u8> {
    let mut sink = Cursor::new(target.to_vec());
    apply::apply(&mut sink, records).unwrap();
    sink.into_inner()
}

proptest! {
    #[test]
    fn prop_write_read_roundtrip(records in proptest::collection::vec(record_strategy(), 0..32)) {
        let patch = encode(&records);
        prop_assert_eq!(patch.len() as u64, ips::encoded_size(&records));
        let back = ips::read_patch(Cursor::new(&patch), ReadOptions::default()).unwrap();
        prop_assert!(back.warnings.is_empty());
        let inflate = |rs: &[Record]| rs.iter().map(Record::inflate).collect::<Vec<_>>();
        prop_assert_eq!(inflate(&back.records), inflate(&records));
    }

    #[test]
    fn prop_diff_patch_inverse(
        source in proptest::collection::vec(any::<u8>(), 0..4096),
        edits in proptest::collection::vec((any::<prop::sample::Index>(), any::<u8>()), 0..64),
        rle in any::<bool>(),
    ) {
        let mut target = source.clone();
        if !target.is_empty() {
            for (idx, byte) in edits {
                let i = idx.index(target.len());
                target[i] = byte;
            }
        }
        let records = diff::diff_slices(&source, &target).unwrap();
        let records = if rle { rle::compress(records) } else { records };
        prop_assert_eq!(apply_to(&source, &records), target);
    }

    #[test]
    fn prop_compression_is_idempotent(records in proptest::collection::vec(runny_literal_strategy(), 0..8)) {
        let once = rle::compress(records);
        let twice = rle::compress(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_compression_preserves_writes(records in proptest::collection::vec(runny_literal_strategy(), 0..8)) {
        let packed = rle::compress(records.clone());
        prop_assert_eq!(writes(&packed), writes(&records));
    }

    #[test]
    fn prop_compression_avoids_trailer_offset(
        pre in 1usize..12,
        data in proptest::collection::vec(0u8..3, 1..40),
    ) {
        // Place the record so the trailer offset falls inside it.
        let offset = EOF_OFFSET - pre as u32;
        let mut data = data;
        data.resize(data.len().max(pre + 1), 0);
        let record = Record::literal(offset, data).unwrap();
        let packed = rle::compress_record(record.clone());
        prop_assert!(packed.iter().all(|r| !r.collides_with_trailer()));
        prop_assert_eq!(writes(&packed), writes(std::slice::from_ref(&record)));
        prop_assert_eq!(rle::compress(packed.clone()), packed);
    }

    #[test]
    fn prop_records_never_exceed_limit(extra in 0usize..2048, byte in 1u8..=255) {
        let len = MAX_RECORD_SIZE + extra;
        let source = vec![0u8; len];
        let target = vec![byte; len];
        let records = diff::diff_slices(&source, &target).unwrap();
        prop_assert!(records.iter().all(|r| r.size() <= MAX_RECORD_SIZE));
        prop_assert_eq!(records.iter().map(Record::len).sum::<usize>(), len);
    }
}

#[test]
fn diff_around_trailer_offset_never_collides() {
    // Every change length that could start a record on the trailer offset.
    let len = EOF_OFFSET as usize + 8;
    let source = vec![0u8; len];
    for width in [1usize, 2, 5] {
        let mut target = source.clone();
        let at = EOF_OFFSET as usize;
        target[at..at + width].fill(0xC3);
        let records = diff::diff_slices(&source, &target).unwrap();
        assert!(records.iter().all(|r| !r.collides_with_trailer()));
        assert_eq!(apply_to(&source, &records), target);
    }
}
