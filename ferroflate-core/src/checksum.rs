//! Running checksums for stream framing.
//!
//! Two checksums cover the framing formats ferroflate emits:
//!
//! - **Adler-32** (RFC 1950): used by the zlib wrapper, and for the
//!   dictionary identifier when a preset dictionary is in play.
//! - **CRC-32** (ISO 3309, polynomial 0xEDB88320): used by the gzip wrapper.
//!
//! Both are incremental: the stream driver updates them with exactly the
//! uncompressed input bytes, in order, once per byte.

/// Largest prime smaller than 65536.
const ADLER_MOD: u32 = 65521;

/// Number of bytes that can be summed before the running totals must be
/// reduced to avoid overflowing 32 bits.
const ADLER_NMAX: usize = 5552;

/// Adler-32 checksum calculator (RFC 1950).
///
/// # Example
///
/// ```
/// use ferroflate_core::checksum::Adler32;
///
/// assert_eq!(Adler32::checksum(b"Hello"), 0x058C01F5);
/// assert_eq!(Adler32::checksum(b""), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Adler32 {
    a: u32,
    b: u32,
}

impl Adler32 {
    /// Create a new Adler-32 calculator with the initial value 1.
    pub fn new() -> Self {
        Self { a: 1, b: 0 }
    }

    /// Resume from a previously finished checksum value.
    pub fn from_value(value: u32) -> Self {
        Self {
            a: value & 0xFFFF,
            b: value >> 16,
        }
    }

    /// Update the checksum with more data.
    pub fn update(&mut self, data: &[u8]) {
        let mut a = self.a;
        let mut b = self.b;
        let mut remaining = data;

        while remaining.len() >= ADLER_NMAX {
            let (chunk, rest) = remaining.split_at(ADLER_NMAX);
            remaining = rest;

            for &byte in chunk {
                a += byte as u32;
                b += a;
            }
            a %= ADLER_MOD;
            b %= ADLER_MOD;
        }

        for &byte in remaining {
            a += byte as u32;
            b += a;
        }

        self.a = a % ADLER_MOD;
        self.b = b % ADLER_MOD;
    }

    /// Return the current checksum value.
    pub fn finish(&self) -> u32 {
        (self.b << 16) | self.a
    }

    /// Compute the Adler-32 checksum of `data` in one shot.
    pub fn checksum(data: &[u8]) -> u32 {
        let mut adler = Self::new();
        adler.update(data);
        adler.finish()
    }
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

/// CRC-32 lookup table (polynomial 0xEDB88320, reflected).
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// CRC-32 calculator (ISO 3309).
///
/// The standard CRC used by gzip, ZIP and PNG:
///
/// - Polynomial: 0x04C11DB7 (reflected: 0xEDB88320)
/// - Initial value: 0xFFFFFFFF
/// - Final XOR: 0xFFFFFFFF
/// - Reflected input and output
///
/// # Example
///
/// ```
/// use ferroflate_core::checksum::Crc32;
///
/// let mut crc = Crc32::new();
/// crc.update(b"Hello, World!");
/// assert_eq!(crc.finalize(), 0xEC4AC3D0);
/// ```
#[derive(Debug, Clone)]
pub struct Crc32 {
    crc: u32,
}

impl Crc32 {
    /// Create a new CRC-32 calculator.
    pub fn new() -> Self {
        Self { crc: 0xFFFFFFFF }
    }

    /// Resume from a previously finalized checksum value.
    pub fn from_value(value: u32) -> Self {
        Self { crc: value ^ 0xFFFFFFFF }
    }

    /// Update the CRC with more data.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        let mut crc = self.crc;
        for &byte in data {
            crc = (crc >> 8) ^ CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize];
        }
        self.crc = crc;
    }

    /// Return the finalized checksum value.
    pub fn finalize(&self) -> u32 {
        self.crc ^ 0xFFFFFFFF
    }

    /// Compute the CRC-32 of `data` in one shot.
    pub fn compute(data: &[u8]) -> u32 {
        let mut crc = Self::new();
        crc.update(data);
        crc.finalize()
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}
