//! # Ferroflate Deflate
//!
//! A near-optimal DEFLATE (RFC 1951) compressor with zlib (RFC 1950) and
//! gzip (RFC 1952) framing.
//!
//! The encoder aims for the compression ratio of slow multi-pass optimizers
//! at a fraction of their cost. Instead of hash chains and greedy matching,
//! it builds a suffix array over each block, enumerates a small set of
//! candidate matches per position from an LCP-interval tree, and selects
//! among them with a backwards dynamic-programming parse driven by the
//! actual Huffman bit costs. Blocks are split where switching Huffman
//! tables pays for its own overhead, and any sub-block that fails to beat
//! its raw size is re-emitted as stored blocks.
//!
//! ## Pipeline
//!
//! ```text
//! input ──► window ──► MatchFinder (suffix array + LCP intervals)
//!                          │ up to 8 candidates per position
//!                          ▼
//!                     BlockSplitter ──► per sub-block:
//!                          │              cost-converged optimal parse,
//!                          │              static/dynamic table choice,
//!                          ▼              stored fallback
//!                     BitWriter ──► framing (raw / zlib / gzip)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use ferroflate_deflate::{memory_compress, Framing};
//!
//! let data = b"Hello, World! Hello, World! Hello, World!";
//! let compressed = memory_compress(data, Framing::Gzip, 0).unwrap();
//! assert!(!compressed.is_empty());
//! ```
//!
//! Decompression is out of scope; the output is verified against
//! third-party conforming decoders in the test suite.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod block;
pub mod frame;
pub mod huffman;
pub mod matchfinder;
pub mod optimal;
pub mod splitter;
pub mod stream;
pub mod tables;

// Re-exports
pub use frame::Framing;
pub use huffman::HuffmanEncoder;
pub use matchfinder::{Match, MatchFinder};
pub use stream::{compress_bound, memory_compress, CompressStream, StreamProgress};
