//! Ipsy: IPS (International Patching System) patches in Rust.
//!
//! The crate provides:
//! - A bit-exact IPS codec with the RLE record extension (`ips`)
//! - A positional differ (`diff`) and an RLE compression pass (`rle`)
//! - Destructive patch application (`apply`)
//! - Patch merging with optional cleanup against a target (`merge`)
//! - Whole-buffer (`engine`) and file-level (`io`) helpers
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use ipsy::diff::DiffOptions;
//! use ipsy::engine;
//! use ipsy::ips::ReadOptions;
//!
//! let source = b"hello old world";
//! let target = b"hello new world";
//!
//! let encoded = engine::diff_bytes(source, target, DiffOptions { rle: true }).unwrap();
//! let patched = engine::patch_bytes(source, &encoded.patch, ReadOptions::default()).unwrap();
//! assert_eq!(patched.data, target);
//! ```

pub mod apply;
pub mod diff;
pub mod engine;
pub mod io;
pub mod ips;
pub mod merge;
pub mod rle;

#[cfg(feature = "cli")]
pub mod cli;
