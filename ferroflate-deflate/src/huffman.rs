//! Canonical Huffman code construction and table transmission.
//!
//! [`HuffmanEncoder`] tracks per-symbol frequencies, derives length-limited
//! canonical code lengths with the in-place Moffat-Katajainen method, and
//! issues bit-reversed codewords ready for LSB-first emission.
//!
//! Dynamic DEFLATE blocks transmit their two symbol-length sequences
//! through a 19-symbol code-length alphabet with run-length codes
//! (16 = repeat previous, 17/18 = zero runs). Which of those codes a block
//! uses is itself a search space: the encoder estimates the table cost
//! under a small set of enablement masks and emits with the cheapest one.
//! The estimator, the frequency counter and the emitter all walk the runs
//! through one shared enumerator, so they cannot disagree.

use crate::tables::CODELEN_ORDER;
use ferroflate_core::bitstream::BitWriter;
use ferroflate_core::error::{FerroflateError, Result};

/// Largest alphabet any encoder instance has to handle (literal/length).
pub const MAX_SYMBOLS: usize = 288;

/// Highest RLE enablement mask value searched by the block encoder.
pub const MAX_CODES_MASK: u32 = 31;

/// One action in the run-length encoding of a symbol-length sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RleOp {
    /// A single code length emitted through the code-length alphabet.
    Literal(u32),
    /// Symbol 16: repeat the previous length `count` times (3..=6).
    Repeat(u32),
    /// Symbol 17: `count` zero lengths (3..=10).
    ZeroShort(u32),
    /// Symbol 18: `count` zero lengths (11..=138).
    ZeroLong(u32),
}

/// Enumerate the RLE operations for `lengths` under an enablement mask.
///
/// Mask semantics: bit 0 enables symbol 16, bit 1 enables 17, bit 2
/// enables 18. Bit 3 set disables splitting a run of 7 repeats into 4+3;
/// bit 4 set disables splitting a run of 8 repeats into 4+4. With the
/// relevant bits clear, runs fall back to plain literals.
fn walk_rle_ops<F>(lengths: &[u32], mask: u32, f: &mut F) -> Result<()>
where
    F: FnMut(RleOp) -> Result<()>,
{
    let mut i = 0;
    while i < lengths.len() {
        let len = lengths[i];
        let mut run = 1;
        while i + run < lengths.len() && lengths[i + run] == len {
            run += 1;
        }

        if len == 0 {
            if run >= 3 {
                while run >= 11 && mask & 4 != 0 {
                    let chunk = run.min(138);
                    f(RleOp::ZeroLong(chunk as u32))?;
                    run -= chunk;
                    i += chunk;
                }
                while run >= 3 && mask & 2 != 0 {
                    let chunk = run.min(10);
                    f(RleOp::ZeroShort(chunk as u32))?;
                    run -= chunk;
                    i += chunk;
                }
                if run > 0 {
                    // Leftover zeroes are re-scanned one at a time.
                    f(RleOp::Literal(0))?;
                    i += 1;
                }
            } else {
                f(RleOp::Literal(0))?;
                i += 1;
            }
        } else {
            let mut run = run - 1;
            f(RleOp::Literal(len))?;
            i += 1;

            if run == 7 && mask & 1 != 0 && mask & 8 == 0 {
                f(RleOp::Repeat(4))?;
                f(RleOp::Repeat(3))?;
                run = 0;
                i += 7;
            } else if run == 8 && mask & 1 != 0 && mask & 16 == 0 {
                f(RleOp::Repeat(4))?;
                f(RleOp::Repeat(4))?;
                run = 0;
                i += 8;
            }

            while run >= 3 && mask & 1 != 0 {
                let chunk = run.min(6);
                f(RleOp::Repeat(chunk as u32))?;
                run -= chunk;
                i += chunk;
            }
            // A short tail of repeats is re-scanned as literals.
        }
    }
    Ok(())
}

/// A Huffman code builder and emitter for one DEFLATE alphabet.
///
/// Holds frequencies, code lengths and reversed codewords for up to
/// [`MAX_SYMBOLS`] symbols. The same type serves the literal/length
/// alphabet, the distance alphabet and the code-length alphabet; only the
/// symbol count and maximum code length differ.
#[derive(Debug, Clone)]
pub struct HuffmanEncoder {
    /// Number of symbols codes are built for.
    symbol_count: usize,
    /// Longest permitted codeword, in bits.
    max_code_length: u32,
    /// Per-symbol frequency counters.
    pub(crate) entropy: [u32; MAX_SYMBOLS],
    /// Per-symbol code lengths; 0 marks an unused symbol.
    pub(crate) code_length: [u32; MAX_SYMBOLS],
    /// Per-symbol codewords, already bit-reversed for LSB-first output.
    code_word: [u32; MAX_SYMBOLS],
}

impl HuffmanEncoder {
    /// Create an encoder for `symbol_count` symbols with codewords no
    /// longer than `max_code_length` bits. Until a table is built, every
    /// symbol reports `default_code_length` bits.
    pub fn new(symbol_count: usize, max_code_length: u32, default_code_length: u32) -> Self {
        assert!(symbol_count <= MAX_SYMBOLS);
        let mut code_length = [0u32; MAX_SYMBOLS];
        code_length[..symbol_count].fill(default_code_length);
        Self {
            symbol_count,
            max_code_length,
            entropy: [0; MAX_SYMBOLS],
            code_length,
            code_word: [0; MAX_SYMBOLS],
        }
    }

    /// Number of symbols this encoder builds codes for.
    pub fn symbol_count(&self) -> usize {
        self.symbol_count
    }

    /// Record one occurrence of `symbol`.
    #[inline]
    pub fn add_entropy(&mut self, symbol: usize) {
        debug_assert!(symbol < self.symbol_count);
        self.entropy[symbol] += 1;
    }

    /// Code length of `symbol` under the current table, in bits.
    #[inline]
    pub fn symbol_cost(&self, symbol: usize) -> u32 {
        self.code_length[symbol]
    }

    /// Clear all frequency counters.
    pub fn reset_entropy(&mut self) {
        self.entropy[..self.symbol_count].fill(0);
    }

    /// Issue canonical codewords for externally supplied code lengths.
    ///
    /// Used for the static RFC 1951 tables, where every symbol has a
    /// predefined length.
    pub fn build_static_codewords(&mut self) {
        let symbols: Vec<usize> = (0..self.symbol_count).collect();
        let order = Self::sorted_by_length(&symbols, &self.code_length);
        self.issue_canonical_codewords(&order);
    }

    /// Compute canonical code lengths from the recorded frequencies using
    /// the in-place Moffat-Katajainen method.
    ///
    /// Symbols with zero frequency receive length 0. With zero or one
    /// active symbols, the single present symbol (or symbol 0 when none)
    /// receives length 1. Lengths are not yet limited to
    /// `max_code_length`; that happens in [`build_dynamic_codewords`].
    ///
    /// [`build_dynamic_codewords`]: HuffmanEncoder::build_dynamic_codewords
    pub fn estimate_dynamic_codelens(&mut self) {
        let mut active: Vec<usize> = (0..self.symbol_count)
            .filter(|&s| self.entropy[s] != 0)
            .collect();

        if active.len() <= 1 {
            let single = active.first().copied().unwrap_or(0);
            self.code_length = [0; MAX_SYMBOLS];
            self.code_length[single] = 1;
            return;
        }

        active.sort_by_key(|&s| (self.entropy[s], s));

        // Moffat & Katajainen, "In-Place Calculation of Minimum-Redundancy
        // Codes". a[] starts as the sorted frequencies, becomes internal
        // node weights, then parent indices, then leaf depths.
        let n = active.len();
        let mut a: Vec<usize> = active.iter().map(|&s| self.entropy[s] as usize).collect();

        // Phase 1: pairwise combination. s scans leaves, r scans internal
        // node weights stored in the prefix of a[].
        let mut s = 0;
        let mut r = 0;
        for t in 0..n - 1 {
            let mut weight = 0;
            for _ in 0..2 {
                if s >= n || (r < t && a[r] < a[s]) {
                    weight += a[r];
                    a[r] = t + 1;
                    r += 1;
                } else {
                    weight += a[s];
                    s += 1;
                }
            }
            a[t] = weight;
        }

        // Phase 2: convert parent indices to depths, then expand internal
        // depths into leaf depths.
        a[n - 2] = 0;
        for t in (0..n.saturating_sub(2)).rev() {
            a[t] = a[a[t] - 1] + 1;
        }

        let mut avail = 1usize;
        let mut used = 0usize;
        let mut depth = 0usize;
        let mut next = n as isize - 1;
        let mut t = n as isize - 2;
        while avail > 0 {
            while t >= 0 && a[t as usize] == depth {
                used += 1;
                t -= 1;
            }
            while avail > used {
                a[next as usize] = depth;
                next -= 1;
                avail -= 1;
            }
            avail = used * 2;
            depth += 1;
            used = 0;
        }

        self.code_length = [0; MAX_SYMBOLS];
        for (rank, &symbol) in active.iter().enumerate() {
            self.code_length[symbol] = a[rank] as u32;
        }
    }

    /// Build the dynamic table: estimate code lengths, enforce the length
    /// limit by Kraft-sum adjustment, and issue canonical codewords.
    pub fn build_dynamic_codewords(&mut self) {
        self.estimate_dynamic_codelens();

        let mut active: Vec<usize> = (0..self.symbol_count)
            .filter(|&s| self.code_length[s] != 0)
            .collect();
        if active.is_empty() || self.max_code_length == 0 {
            return;
        }

        let mut order = Self::sorted_by_length(&active, &self.code_length);

        if self.code_length[*order.last().unwrap()] > self.max_code_length {
            // Clamp everything to the limit and add up the Kraft sum.
            let max_k = 1usize << self.max_code_length;
            let mut k = 0usize;
            for &symbol in order.iter().rev() {
                if self.code_length[symbol] > self.max_code_length {
                    self.code_length[symbol] = self.max_code_length;
                }
                k += max_k >> self.code_length[symbol];
            }

            // Over-subscribed: lengthen the least frequent symbols until
            // the code fits again.
            for idx in (0..order.len()).rev() {
                if k <= max_k {
                    break;
                }
                let symbol = order[idx];
                while self.code_length[symbol] < self.max_code_length && k > max_k {
                    self.code_length[symbol] += 1;
                    k -= max_k >> self.code_length[symbol];
                }
            }

            // If slack remains, shorten the most frequent symbols; a
            // complete code (Kraft sum exactly one) is required downstream.
            for &symbol in &order {
                if k >= max_k {
                    break;
                }
                while k + (max_k >> self.code_length[symbol]) <= max_k {
                    k += max_k >> self.code_length[symbol];
                    debug_assert!(self.code_length[symbol] > 1);
                    self.code_length[symbol] -= 1;
                }
            }

            // The adjustment may reorder symbols within a length.
            active.retain(|&s| self.code_length[s] != 0);
            order = Self::sorted_by_length(&active, &self.code_length);
        }

        self.issue_canonical_codewords(&order);
    }

    /// Sort symbols by (code length, symbol index) ascending.
    fn sorted_by_length(symbols: &[usize], code_length: &[u32; MAX_SYMBOLS]) -> Vec<usize> {
        let mut order = symbols.to_vec();
        order.sort_by_key(|&s| (code_length[s], s));
        order
    }

    /// Assign consecutive canonical codewords in `order`, storing each one
    /// bit-reversed for LSB-first emission.
    fn issue_canonical_codewords(&mut self, order: &[usize]) {
        if order.is_empty() {
            return;
        }
        let mut codeword = 0u16;
        let mut length = self.code_length[order[0]];
        for (i, &symbol) in order.iter().enumerate() {
            self.code_word[symbol] = (codeword.reverse_bits() >> (16 - length)) as u32;
            if i + 1 < order.len() {
                let next_length = self.code_length[order[i + 1]];
                codeword = (codeword + 1) << (next_length - length);
                length = next_length;
            }
        }
    }

    /// Emit the codeword for `symbol`.
    pub fn write_codeword(&self, symbol: usize, writer: &mut BitWriter) -> Result<()> {
        if symbol >= self.symbol_count {
            return Err(FerroflateError::compression(format!(
                "symbol {symbol} out of range"
            )));
        }
        writer.put_bits(self.code_word[symbol], self.code_length[symbol])
    }

    /// Number of code-length-alphabet entries that must be transmitted:
    /// trailing zero lengths in the DEFLATE permutation are trimmed, but
    /// never below four.
    pub fn raw_table_size(&self) -> usize {
        let mut count = self.symbol_count;
        while count > 4 && self.code_length[CODELEN_ORDER[count - 1]] == 0 {
            count -= 1;
        }
        count
    }

    /// Emit the raw code-length table: `count` three-bit lengths in the
    /// DEFLATE permutation order.
    pub fn write_raw_table(&self, len_bits: u32, count: usize, writer: &mut BitWriter) -> Result<()> {
        if !(4..=self.symbol_count).contains(&count) {
            return Err(FerroflateError::compression(
                "raw code-length table size out of range",
            ));
        }
        for &symbol in CODELEN_ORDER.iter().take(count) {
            writer.put_bits(self.code_length[symbol], len_bits)?;
        }
        Ok(())
    }

    /// Number of symbols whose lengths must be transmitted: trailing zero
    /// lengths trimmed, but never below `min_symbols`.
    pub fn defined_symbol_count(&self, min_symbols: usize) -> usize {
        let mut count = self.symbol_count;
        while count > min_symbols && self.code_length[count - 1] == 0 {
            count -= 1;
        }
        count
    }

    /// Accumulate code-length-alphabet frequencies for transmitting
    /// `lengths` under `mask`. `self` is the code-length-alphabet encoder.
    pub fn update_lengths_entropy(&mut self, lengths: &[u32], mask: u32) {
        let entropy = &mut self.entropy;
        walk_rle_ops(lengths, mask, &mut |op| {
            match op {
                RleOp::Literal(len) => entropy[len.min(15) as usize] += 1,
                RleOp::Repeat(_) => entropy[16] += 1,
                RleOp::ZeroShort(_) => entropy[17] += 1,
                RleOp::ZeroLong(_) => entropy[18] += 1,
            }
            Ok(())
        })
        .expect("counting cannot fail");
    }

    /// Bit cost of transmitting `lengths` under `mask` with the current
    /// code-length-alphabet table.
    pub fn lengths_cost(&self, lengths: &[u32], mask: u32) -> u32 {
        let mut bits = 0u32;
        walk_rle_ops(lengths, mask, &mut |op| {
            bits += match op {
                RleOp::Literal(len) => self.code_length[len.min(15) as usize],
                RleOp::Repeat(_) => self.code_length[16] + 2,
                RleOp::ZeroShort(_) => self.code_length[17] + 3,
                RleOp::ZeroLong(_) => self.code_length[18] + 7,
            };
            Ok(())
        })
        .expect("cost walk cannot fail");
        bits
    }

    /// Emit `lengths` under `mask` with the current code-length-alphabet
    /// table. Enumerates runs identically to [`lengths_cost`].
    ///
    /// [`lengths_cost`]: HuffmanEncoder::lengths_cost
    pub fn write_lengths(&self, lengths: &[u32], mask: u32, writer: &mut BitWriter) -> Result<()> {
        walk_rle_ops(lengths, mask, &mut |op| match op {
            RleOp::Literal(len) => {
                if len > 15 {
                    return Err(FerroflateError::compression("code length exceeds 15"));
                }
                self.write_codeword(len as usize, writer)
            }
            RleOp::Repeat(count) => {
                self.write_codeword(16, writer)?;
                writer.put_bits(count - 3, 2)
            }
            RleOp::ZeroShort(count) => {
                self.write_codeword(17, writer)?;
                writer.put_bits(count - 3, 3)
            }
            RleOp::ZeroLong(count) => {
                self.write_codeword(18, writer)?;
                writer.put_bits(count - 11, 7)
            }
        })
    }
}

/// Smooth a frequency histogram so the derived code lengths form longer
/// runs, which the code-length alphabet transmits more compactly.
///
/// Stretches of counts that are already ideal for run-length coding (five
/// or more equal zeroes, seven or more equal non-zeroes) are left alone;
/// other stretches of four or more near-equal counts are flattened to
/// their rounded average. The caller rebuilds the table from the smoothed
/// histogram and keeps it only if the total block cost actually drops.
pub fn optimize_for_rle(counts: &mut [u32]) {
    let mut length = counts.len();
    while length > 0 && counts[length - 1] == 0 {
        length -= 1;
    }
    if length == 0 {
        return;
    }
    let counts = &mut counts[..length];

    // Mark stretches that RLE already handles well.
    let mut good_for_rle = vec![false; length];
    {
        let mut symbol = counts[0];
        let mut stride = 0usize;
        for i in 0..=length {
            if i == length || counts[i] != symbol {
                if (symbol == 0 && stride >= 5) || (symbol != 0 && stride >= 7) {
                    good_for_rle[i - stride..i].fill(true);
                }
                stride = 1;
                if i != length {
                    symbol = counts[i];
                }
            } else {
                stride += 1;
            }
        }
    }

    // Flatten the remaining near-equal stretches to their average.
    let mut stride = 0usize;
    let mut limit = counts[0];
    let mut sum = 0u32;
    for i in 0..=length {
        if i == length || good_for_rle[i] || counts[i].abs_diff(limit) >= 4 {
            if stride >= 4 || (stride >= 3 && sum == 0) {
                let average = if sum == 0 {
                    0
                } else {
                    ((sum + stride as u32 / 2) / stride as u32).max(1)
                };
                counts[i - stride..i].fill(average);
            }
            stride = 0;
            sum = 0;
            limit = if i + 3 < length {
                (counts[i] + counts[i + 1] + counts[i + 2] + counts[i + 3] + 2) / 4
            } else if i < length {
                counts[i]
            } else {
                0
            };
        }
        stride += 1;
        if i != length {
            sum += counts[i];
        }
    }
}
