//! # Ferroflate Core
//!
//! Core components for the ferroflate compression library.
//!
//! This crate provides the building blocks shared by the encoder crates:
//!
//! - [`bitstream`]: LSB-first bit-level output with checkpoint/rewind
//! - [`checksum`]: Adler-32 and CRC-32 running checksums
//! - [`error`]: Error types
//!
//! ## Architecture
//!
//! Ferroflate is designed as a layered stack:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L3: CLI                                                 │
//! │     file I/O, verification, self-test corpus            │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Codec (ferroflate-deflate)                          │
//! │     match finder, optimal parse, Huffman, framing       │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: this crate                                          │
//! │     BitWriter, Adler-32/CRC-32, error taxonomy          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use ferroflate_core::bitstream::BitWriter;
//! use ferroflate_core::checksum::Crc32;
//!
//! let mut writer = BitWriter::new(16);
//! writer.put_bits(0b101, 3).unwrap();
//! writer.flush_bits().unwrap();
//! assert_eq!(writer.as_slice(), &[0b101]);
//!
//! let crc = Crc32::compute(b"Hello, World!");
//! assert_eq!(crc, 0xEC4AC3D0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bitstream;
pub mod checksum;
pub mod error;

// Re-exports for convenience
pub use bitstream::{BitWriter, BitWriterCheckpoint};
pub use checksum::{Adler32, Crc32};
pub use error::{FerroflateError, Result};
