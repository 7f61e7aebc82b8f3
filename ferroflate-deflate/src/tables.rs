//! DEFLATE symbol geometry (RFC 1951 sections 3.2.5 and 3.2.6).
//!
//! Length and distance values are mapped to Huffman symbols plus extra
//! bits. To keep the hot encoder paths branch-free, both mappings go
//! through direct lookup tables:
//!
//! - lengths are indexed by `length - MIN_MATCH` (one 256-entry bank);
//! - offsets 1..=256 are indexed directly, offsets 257..=32768 through a
//!   second bank in steps of 128 (`((offset-1) - 256) >> 7`), which is
//!   exact because every distance code covering offsets above 256 spans a
//!   multiple of 128.

/// Minimum match length.
pub const MIN_MATCH: usize = 3;

/// Maximum match length.
pub const MAX_MATCH: usize = 258;

/// Minimum match offset.
pub const MIN_OFFSET: usize = 1;

/// Maximum match offset, equal to the DEFLATE window size.
pub const MAX_OFFSET: usize = 32768;

/// Number of history bytes kept between blocks.
pub const HISTORY_SIZE: usize = 32768;

/// Size of the literal/length alphabet, including the two reserved symbols.
pub const NLITERALSYMS: usize = 288;

/// Number of literal/length symbols a conforming stream may actually use.
pub const NVALIDLITERALSYMS: usize = 286;

/// End-of-block symbol.
pub const EOB_SYMBOL: usize = 256;

/// First match length symbol.
pub const LENGTH_SYMBOL_START: usize = 257;

/// Size of the distance alphabet, including the two reserved symbols.
pub const NOFFSETSYMS: usize = 32;

/// Number of distance symbols a conforming stream may actually use.
pub const NVALIDOFFSETSYMS: usize = 30;

/// Size of the code-length alphabet used to transmit dynamic tables.
pub const NCODELENSYMS: usize = 19;

/// Bits per entry in the raw code-length table.
pub const NCODELENBITS: u32 = 3;

/// Transmission order of the code-length alphabet (RFC 1951 section 3.2.7).
pub const CODELEN_ORDER: [usize; NCODELENSYMS] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Base length for length codes 257-285.
pub const LENGTH_CODE_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, // 257-264: 0 extra bits
    11, 13, 15, 17, // 265-268: 1 extra bit
    19, 23, 27, 31, // 269-272: 2 extra bits
    35, 43, 51, 59, // 273-276: 3 extra bits
    67, 83, 99, 115, // 277-280: 4 extra bits
    131, 163, 195, 227, // 281-284: 5 extra bits
    258, // 285: 0 extra bits
];

/// Extra bits for length codes 257-285.
pub const LENGTH_CODE_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Base distance for distance codes 0-29.
pub const DISTANCE_CODE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Extra bits for distance codes 0-29.
pub const DISTANCE_CODE_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Distance code for an arbitrary offset, by scanning the base table.
const fn distance_code_for(offset: u16) -> usize {
    let mut code = 29;
    loop {
        if DISTANCE_CODE_BASE[code] <= offset {
            return code;
        }
        code -= 1;
    }
}

/// Length code for an arbitrary length, by scanning the base table.
const fn length_code_for(length: u16) -> usize {
    let mut code = 28;
    loop {
        if LENGTH_CODE_BASE[code] <= length {
            return code;
        }
        code -= 1;
    }
}

/// Per-`length - MIN_MATCH` symbol bank (values 257..=285).
pub const LEN_SYMBOL: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = (LENGTH_SYMBOL_START + length_code_for(i as u16 + MIN_MATCH as u16)) as u16;
        i += 1;
    }
    table
};

/// Per-`length - MIN_MATCH` extra bit counts.
pub const LEN_EXTRA_BITS: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = LENGTH_CODE_EXTRA[length_code_for(i as u16 + MIN_MATCH as u16)];
        i += 1;
    }
    table
};

/// Per-`length - MIN_MATCH` base values, in the same encoded domain.
pub const LEN_BASE: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = LENGTH_CODE_BASE[length_code_for(i as u16 + MIN_MATCH as u16)] - MIN_MATCH as u16;
        i += 1;
    }
    table
};

/// Representative offset for an index into the two-bank offset tables.
const fn bank_offset(idx: usize) -> u16 {
    if idx < 256 {
        idx as u16 + 1
    } else {
        (257 + (idx - 256) * 128) as u16
    }
}

/// Two-bank offset symbol table.
///
/// Indexed by `offset - 1` when below 256, else by
/// `256 + ((offset - 1 - 256) >> 7)`. Indices 510 and 511 are unused.
pub const OFFSET_SYMBOL: [u16; 512] = {
    let mut table = [0u16; 512];
    let mut i = 0;
    while i < 510 {
        table[i] = distance_code_for(bank_offset(i)) as u16;
        i += 1;
    }
    table
};

/// Two-bank offset extra bit counts.
pub const OFFSET_EXTRA_BITS: [u8; 512] = {
    let mut table = [0u8; 512];
    let mut i = 0;
    while i < 510 {
        table[i] = DISTANCE_CODE_EXTRA[distance_code_for(bank_offset(i))];
        i += 1;
    }
    table
};

/// Two-bank offset base values.
pub const OFFSET_BASE: [u16; 512] = {
    let mut table = [0u16; 512];
    let mut i = 0;
    while i < 510 {
        table[i] = DISTANCE_CODE_BASE[distance_code_for(bank_offset(i))];
        i += 1;
    }
    table
};

/// Index into the two-bank offset tables for a match offset (1..=32768).
#[inline]
pub fn offset_table_index(offset: u32) -> usize {
    let idx = (offset - 1) as usize;
    if idx < 256 {
        idx
    } else {
        256 + ((idx - 256) >> 7)
    }
}

/// Huffman symbol, extra bit count and displacement for a match offset.
#[inline]
pub fn offset_parts(offset: u32) -> (u16, u8, u16) {
    let idx = offset_table_index(offset);
    (
        OFFSET_SYMBOL[idx],
        OFFSET_EXTRA_BITS[idx],
        offset as u16 - OFFSET_BASE[idx],
    )
}

/// Huffman symbol for a match offset.
#[inline]
pub fn offset_symbol(offset: u32) -> u16 {
    OFFSET_SYMBOL[offset_table_index(offset)]
}

/// Huffman symbol, extra bit count and displacement for an encoded match
/// length (`length - MIN_MATCH`, clamped to 255).
#[inline]
pub fn length_parts(encoded_len: u32) -> (u16, u8, u16) {
    let idx = encoded_len.min(255) as usize;
    (
        LEN_SYMBOL[idx],
        LEN_EXTRA_BITS[idx],
        encoded_len as u16 - LEN_BASE[idx],
    )
}

/// Huffman symbol for an encoded match length.
#[inline]
pub fn length_symbol(encoded_len: u32) -> u16 {
    LEN_SYMBOL[encoded_len.min(255) as usize]
}

/// Fixed literal/length code lengths (RFC 1951 section 3.2.6).
pub fn fixed_litlen_lengths() -> [u32; NLITERALSYMS] {
    let mut lengths = [0u32; NLITERALSYMS];
    let mut i = 0;
    while i < 144 {
        lengths[i] = 8;
        i += 1;
    }
    while i < 256 {
        lengths[i] = 9;
        i += 1;
    }
    while i < 280 {
        lengths[i] = 7;
        i += 1;
    }
    while i < NLITERALSYMS {
        lengths[i] = 8;
        i += 1;
    }
    lengths
}

/// Fixed distance code lengths: 5 bits for every symbol.
pub fn fixed_distance_lengths() -> [u32; NOFFSETSYMS] {
    [5u32; NOFFSETSYMS]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_symbol_boundaries() {
        // length 3 -> symbol 257, no extra bits
        assert_eq!(length_parts(0), (257, 0, 0));
        // length 10 -> symbol 264
        assert_eq!(length_parts(7), (264, 0, 0));
        // length 11 -> symbol 265, 1 extra bit, displacement 0
        assert_eq!(length_parts(8), (265, 1, 0));
        // length 12 -> symbol 265, displacement 1
        assert_eq!(length_parts(9), (265, 1, 1));
        // length 258 -> symbol 285, no extra bits
        assert_eq!(length_parts(255), (285, 0, 0));
        // length 257 -> symbol 284, 5 extra bits, displacement 30
        assert_eq!(length_parts(254), (284, 5, 30));
    }

    #[test]
    fn test_length_roundtrip() {
        for encoded in 0u32..=255 {
            let (sym, extra_bits, disp) = length_parts(encoded);
            assert!((257..=285).contains(&sym));
            let base = LENGTH_CODE_BASE[sym as usize - 257] as u32 - MIN_MATCH as u32;
            assert_eq!(base + disp as u32, encoded);
            assert!((disp as u32) < (1 << extra_bits).max(1));
        }
    }

    #[test]
    fn test_offset_symbol_boundaries() {
        assert_eq!(offset_parts(1), (0, 0, 0));
        assert_eq!(offset_parts(4), (3, 0, 0));
        assert_eq!(offset_parts(5), (4, 1, 0));
        assert_eq!(offset_parts(6), (4, 1, 1));
        assert_eq!(offset_parts(256), (15, 6, 63));
        assert_eq!(offset_parts(257), (16, 7, 0));
        assert_eq!(offset_parts(32768), (29, 13, 8191));
    }

    #[test]
    fn test_offset_roundtrip() {
        for offset in 1u32..=32768 {
            let (sym, extra_bits, disp) = offset_parts(offset);
            assert!((sym as usize) < NVALIDOFFSETSYMS);
            let base = DISTANCE_CODE_BASE[sym as usize] as u32;
            assert_eq!(base + disp as u32, offset, "offset {}", offset);
            assert_eq!(extra_bits, DISTANCE_CODE_EXTRA[sym as usize]);
        }
    }

    #[test]
    fn test_second_bank_alignment() {
        // Every distance code above offset 256 must cover a whole number of
        // 128-offset bank slots, or the bank lookup would be wrong.
        for code in 16..30 {
            assert_eq!((DISTANCE_CODE_BASE[code] as u32 - 257) % 128, 0);
        }
    }

    #[test]
    fn test_fixed_lengths() {
        let lengths = fixed_litlen_lengths();
        assert_eq!(lengths[0], 8);
        assert_eq!(lengths[143], 8);
        assert_eq!(lengths[144], 9);
        assert_eq!(lengths[255], 9);
        assert_eq!(lengths[256], 7);
        assert_eq!(lengths[279], 7);
        assert_eq!(lengths[280], 8);
        assert_eq!(lengths[287], 8);
        assert!(fixed_distance_lengths().iter().all(|&l| l == 5));
    }
}
