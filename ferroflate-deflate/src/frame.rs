//! Stream framing: raw DEFLATE, zlib (RFC 1950) and gzip (RFC 1952).
//!
//! The framing layer owns everything outside the DEFLATE bitstream: the
//! header bytes emitted before the first block, the running checksum over
//! the uncompressed input, and the trailer after the last block.
//!
//! ```text
//! zlib:  +-----+-----+ · · · · · · · · · +----------------+
//!        | CMF | FLG |  deflate stream   | ADLER32 (BE)   |
//!        +-----+-----+ · · · · · · · · · +----------------+
//! gzip:  +--------------------+ · · · · +---------+----------+
//!        | 10-byte header     | deflate | CRC32LE | ISIZE LE |
//!        +--------------------+ · · · · +---------+----------+
//! ```

use crate::tables::HISTORY_SIZE;
use ferroflate_core::checksum::{Adler32, Crc32};
use ferroflate_core::error::{FerroflateError, Result};

/// gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Compression method 8 = DEFLATE, for both zlib CMF and gzip CM.
const CM_DEFLATE: u8 = 8;

/// Stream framing selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Raw DEFLATE bitstream, no wrapper, no checksum.
    Deflate,
    /// zlib wrapper (RFC 1950) with a big-endian Adler-32 trailer.
    Zlib,
    /// gzip wrapper (RFC 1952) with CRC-32 and length trailer.
    #[default]
    Gzip,
}

impl Framing {
    /// Header size in bytes, given whether a preset dictionary is set.
    pub fn header_size(self, has_dictionary: bool) -> usize {
        match self {
            Framing::Deflate => 0,
            Framing::Zlib => {
                if has_dictionary {
                    6
                } else {
                    2
                }
            }
            Framing::Gzip => 10,
        }
    }

    /// Trailer size in bytes.
    pub fn footer_size(self) -> usize {
        match self {
            Framing::Deflate => 0,
            Framing::Zlib => 4,
            Framing::Gzip => 8,
        }
    }

    /// Encode the stream header.
    ///
    /// For zlib with a preset dictionary, the FDICT bit is set and the
    /// dictionary's Adler-32 follows the two header bytes, big-endian.
    pub(crate) fn encode_header(self, dictionary: Option<&[u8]>) -> Result<Vec<u8>> {
        if dictionary.is_some() && self != Framing::Zlib {
            return Err(FerroflateError::dictionary(
                "preset dictionaries require zlib framing",
            ));
        }
        match self {
            Framing::Deflate => Ok(Vec::new()),
            Framing::Zlib => {
                // CMF: CINFO=7 (32 KiB window), CM=8
                let cmf: u8 = 0x78;
                // FLG: FLEVEL=3 (maximum), FDICT, and FCHECK so that
                // (CMF*256 + FLG) is a multiple of 31
                let flevel = 3u8;
                let fdict = u8::from(dictionary.is_some());
                let flg_base = (flevel << 6) | (fdict << 5);
                let remainder = ((cmf as u16) * 256 + flg_base as u16) % 31;
                let fcheck = if remainder == 0 {
                    0
                } else {
                    (31 - remainder) as u8
                };
                let mut header = vec![cmf, flg_base | fcheck];
                if let Some(dict) = dictionary {
                    header.extend_from_slice(&Adler32::checksum(dict).to_be_bytes());
                }
                Ok(header)
            }
            Framing::Gzip => {
                // Magic, CM, FLG=0, MTIME=0, XFL=2 (maximum compression),
                // OS=255 (unknown)
                let mut header = Vec::with_capacity(10);
                header.extend_from_slice(&GZIP_MAGIC);
                header.push(CM_DEFLATE);
                header.push(0);
                header.extend_from_slice(&0u32.to_le_bytes());
                header.push(2);
                header.push(255);
                Ok(header)
            }
        }
    }

    /// Initial value of the running checksum.
    pub(crate) fn init_checksum(self) -> u32 {
        match self {
            Framing::Deflate => 0,
            Framing::Zlib => 1,
            Framing::Gzip => 0,
        }
    }

    /// Fold `data` into the running checksum.
    pub(crate) fn update_checksum(self, current: u32, data: &[u8]) -> u32 {
        match self {
            Framing::Deflate => 0,
            Framing::Zlib => {
                let mut adler = Adler32::from_value(current);
                adler.update(data);
                adler.finish()
            }
            Framing::Gzip => {
                let mut crc = Crc32::from_value(current);
                crc.update(data);
                crc.finalize()
            }
        }
    }

    /// Encode the stream trailer.
    pub(crate) fn encode_footer(self, checksum: u32, total_in: u64) -> Vec<u8> {
        match self {
            Framing::Deflate => Vec::new(),
            Framing::Zlib => checksum.to_be_bytes().to_vec(),
            Framing::Gzip => {
                let mut footer = Vec::with_capacity(8);
                footer.extend_from_slice(&checksum.to_le_bytes());
                footer.extend_from_slice(&(total_in as u32).to_le_bytes());
                footer
            }
        }
    }
}

/// Truncate a preset dictionary to the bytes that can actually be
/// referenced: the last [`HISTORY_SIZE`] bytes.
pub(crate) fn usable_dictionary(dictionary: &[u8]) -> &[u8] {
    if dictionary.len() > HISTORY_SIZE {
        &dictionary[dictionary.len() - HISTORY_SIZE..]
    } else {
        dictionary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zlib_header_check_bits() {
        let header = Framing::Zlib.encode_header(None).unwrap();
        assert_eq!(header.len(), 2);
        assert_eq!(header[0], 0x78);
        assert_eq!(((header[0] as u16) * 256 + header[1] as u16) % 31, 0);
        // FDICT must be clear without a dictionary
        assert_eq!(header[1] & 0x20, 0);
    }

    #[test]
    fn test_zlib_header_with_dictionary() {
        let dict = b"abcdefgh";
        let header = Framing::Zlib.encode_header(Some(dict)).unwrap();
        assert_eq!(header.len(), 6);
        assert_ne!(header[1] & 0x20, 0);
        assert_eq!(((header[0] as u16) * 256 + header[1] as u16) % 31, 0);
        assert_eq!(
            u32::from_be_bytes([header[2], header[3], header[4], header[5]]),
            Adler32::checksum(dict)
        );
    }

    #[test]
    fn test_dictionary_requires_zlib() {
        assert!(Framing::Gzip.encode_header(Some(b"dict")).is_err());
        assert!(Framing::Deflate.encode_header(Some(b"dict")).is_err());
    }

    #[test]
    fn test_gzip_header_layout() {
        let header = Framing::Gzip.encode_header(None).unwrap();
        assert_eq!(
            header,
            vec![0x1F, 0x8B, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0xFF]
        );
    }

    #[test]
    fn test_running_checksums() {
        let data = b"Hello, World!";

        let mut value = Framing::Zlib.init_checksum();
        for chunk in data.chunks(3) {
            value = Framing::Zlib.update_checksum(value, chunk);
        }
        assert_eq!(value, Adler32::checksum(data));

        let mut value = Framing::Gzip.init_checksum();
        for chunk in data.chunks(3) {
            value = Framing::Gzip.update_checksum(value, chunk);
        }
        assert_eq!(value, Crc32::compute(data));
    }

    #[test]
    fn test_footers() {
        assert!(Framing::Deflate.encode_footer(0, 0).is_empty());
        assert_eq!(
            Framing::Zlib.encode_footer(0x11E60398, 9),
            vec![0x11, 0xE6, 0x03, 0x98]
        );
        let gzip = Framing::Gzip.encode_footer(0xAABBCCDD, 0x1_0000_0005);
        // CRC little-endian, then the length modulo 2^32
        assert_eq!(gzip, vec![0xDD, 0xCC, 0xBB, 0xAA, 0x05, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_dictionary_truncation() {
        let long = vec![7u8; HISTORY_SIZE + 100];
        assert_eq!(usable_dictionary(&long).len(), HISTORY_SIZE);
        assert_eq!(usable_dictionary(b"short"), b"short");
    }
}
