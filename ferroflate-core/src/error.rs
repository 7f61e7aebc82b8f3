//! Error types for ferroflate operations.
//!
//! This module provides a single error type covering every failure class the
//! compressor can surface: source/destination I/O, dictionary handling,
//! allocation sizing, and internal compression invariants.
//!
//! Once any of these errors escapes a stream operation, the stream is
//! poisoned and must be torn down; it is not resumable.

use std::io;
use thiserror::Error;

/// The main error type for ferroflate operations.
#[derive(Debug, Error)]
pub enum FerroflateError {
    /// I/O error while reading input.
    #[error("source I/O error: {0}")]
    Io(#[from] io::Error),

    /// Output buffer overflow, including bit writer overflow.
    ///
    /// This is never retried at the block level; it fails the stream.
    #[error("destination overflow: {reason}")]
    Destination {
        /// Description of the overflow.
        reason: String,
    },

    /// Dictionary could not be loaded or applied.
    #[error("dictionary error: {reason}")]
    Dictionary {
        /// Description of the dictionary failure.
        reason: String,
    },

    /// An allocation request was too large to size.
    #[error("allocation failure: requested {requested} bytes")]
    Memory {
        /// Number of bytes requested.
        requested: usize,
    },

    /// Internal compression invariant violated.
    ///
    /// Examples: the parse left bytes unconsumed, the bit writer offset is
    /// corrupt, or a header field could not be encoded.
    #[error("compression error: {reason}")]
    Compression {
        /// Description of the violated invariant.
        reason: String,
    },

    /// Invalid parameter passed to the API.
    #[error("invalid parameter: {reason}")]
    InvalidParameter {
        /// Description of the misuse.
        reason: String,
    },
}

/// Result type alias for ferroflate operations.
pub type Result<T> = std::result::Result<T, FerroflateError>;

impl FerroflateError {
    /// Create a destination overflow error.
    pub fn destination(reason: impl Into<String>) -> Self {
        Self::Destination {
            reason: reason.into(),
        }
    }

    /// Create a dictionary error.
    pub fn dictionary(reason: impl Into<String>) -> Self {
        Self::Dictionary {
            reason: reason.into(),
        }
    }

    /// Create an allocation failure error.
    pub fn memory(requested: usize) -> Self {
        Self::Memory { requested }
    }

    /// Create an internal compression error.
    pub fn compression(reason: impl Into<String>) -> Self {
        Self::Compression {
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            reason: reason.into(),
        }
    }
}
