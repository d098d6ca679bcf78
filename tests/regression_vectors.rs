use std::io::Cursor;

use ipsy::diff::DiffOptions;
use ipsy::engine;
use ipsy::ips::{self, ReadOptions};

#[derive(Debug)]
struct Vector {
    name: String,
    rle: bool,
    source: Vec<u8>,
    target: Vec<u8>,
    patch: Vec<u8>,
}

fn hex_to_bytes(s: &str) -> Vec<u8> {
    let s = s.trim();
    if s.is_empty() {
        return Vec::new();
    }
    assert!(
        s.len().is_multiple_of(2),
        "hex string must have even length"
    );
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

fn load_vectors() -> Vec<Vector> {
    let manifest = include_str!("vectors/manifest.tsv");
    manifest
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|line| {
            let parts: Vec<_> = line.split('|').collect();
            assert_eq!(parts.len(), 5, "invalid vector row: {line}");
            Vector {
                name: parts[0].to_string(),
                rle: parts[1] == "1",
                source: hex_to_bytes(parts[2]),
                target: hex_to_bytes(parts[3]),
                patch: hex_to_bytes(parts[4]),
            }
        })
        .collect()
}

#[test]
fn vector_database_is_non_empty() {
    let vectors = load_vectors();
    assert!(!vectors.is_empty());
    assert!(vectors.iter().any(|v| v.rle));
}

#[test]
fn diff_matches_recorded_patches() {
    for v in load_vectors() {
        let encoded = engine::diff_bytes(&v.source, &v.target, DiffOptions { rle: v.rle })
            .unwrap_or_else(|e| panic!("vector {}: {e}", v.name));
        assert_eq!(encoded.patch, v.patch, "vector {} (rle={})", v.name, v.rle);
    }
}

#[test]
fn recorded_patches_apply() {
    for v in load_vectors() {
        let patched = engine::patch_bytes(&v.source, &v.patch, ReadOptions::default())
            .unwrap_or_else(|e| panic!("vector {}: {e}", v.name));
        assert_eq!(patched.data, v.target, "vector {}", v.name);
        assert!(patched.warnings.is_empty(), "vector {}", v.name);
    }
}

#[test]
fn recorded_patches_reencode_byte_for_byte() {
    for v in load_vectors() {
        let read = ips::read_patch(Cursor::new(&v.patch), ReadOptions::default()).unwrap();
        let mut out = Vec::new();
        ips::write_patch(&mut out, &read.records).unwrap();
        assert_eq!(out, v.patch, "vector {}", v.name);
    }
}
