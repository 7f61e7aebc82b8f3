//! Cost-driven match selection.
//!
//! Given the candidate matches for every position and the current Huffman
//! code lengths, [`OptimalParser`] picks the sequence of literals and
//! matches with the smallest encoded bit cost by backward dynamic
//! programming: `cost[i]` is the cheapest encoding of the block suffix
//! starting at `i`, computed from `end` down to `start`.
//!
//! For each candidate, every usable length is considered, since a match
//! of length 20 may be cheapest when truncated to 11 if that lands the
//! parse on a cheap continuation. Long matches
//! (>= [`LEAVE_ALONE_MATCH_SIZE`]) are the exception and are taken at
//! full length only, which costs nothing measurable on real data and
//! bounds the inner loop.
//!
//! The parse is only optimal relative to the code lengths it was given;
//! the block encoder re-runs it as the lengths converge.

use crate::huffman::HuffmanEncoder;
use crate::matchfinder::{Match, MatchFinder, LAST_LITERALS};
use crate::tables::{
    length_symbol, offset_table_index, LEN_EXTRA_BITS, MIN_MATCH, OFFSET_EXTRA_BITS, OFFSET_SYMBOL,
};

/// Matches at least this long are only considered at their full length.
pub const LEAVE_ALONE_MATCH_SIZE: usize = 40;

/// Bit cost of emitting a literal byte under the current table.
#[inline]
pub(crate) fn literal_cost(literals: &HuffmanEncoder, byte: u8) -> u32 {
    literals.symbol_cost(byte as usize)
}

/// Bit cost of emitting an encoded match length (`length - MIN_MATCH`).
#[inline]
pub(crate) fn length_cost(literals: &HuffmanEncoder, encoded_len: u32) -> u32 {
    let idx = encoded_len.min(255) as usize;
    literals.symbol_cost(length_symbol(encoded_len) as usize) + LEN_EXTRA_BITS[idx] as u32
}

/// Bit cost of emitting a match offset.
#[inline]
pub(crate) fn offset_cost(offsets: &HuffmanEncoder, offset: u32) -> u32 {
    let idx = offset_table_index(offset);
    offsets.symbol_cost(OFFSET_SYMBOL[idx] as usize) + OFFSET_EXTRA_BITS[idx] as u32
}

/// Backward shortest-path selector over the candidate matches.
///
/// Owns the per-position cost array and the chosen-step array; both are
/// allocated once for the largest window and reused across blocks.
#[derive(Debug)]
pub struct OptimalParser {
    /// cost[i]: cheapest bit cost of encoding window[i..end).
    cost: Vec<u32>,
    /// best[i]: chosen step at i; length 0 is a literal.
    best: Vec<Match>,
}

impl OptimalParser {
    /// Allocate a parser for windows up to `max_window_size` bytes.
    pub fn new(max_window_size: usize) -> Self {
        Self {
            cost: vec![0; max_window_size],
            best: vec![Match::default(); max_window_size],
        }
    }

    /// Select the cheapest parse of `window[start..end)` under the given
    /// code lengths. Every position receives a decision; walking the
    /// decisions from `start` consumes exactly `end - start` bytes.
    pub fn optimize(
        &mut self,
        window: &[u8],
        finder: &MatchFinder,
        literals: &HuffmanEncoder,
        offsets: &HuffmanEncoder,
        start: usize,
        end: usize,
    ) {
        if end <= start {
            return;
        }

        // The short-match inner loop re-reads these constantly.
        let mut cached_length_cost = [0u32; LEAVE_ALONE_MATCH_SIZE];
        for (encoded_len, slot) in cached_length_cost.iter_mut().enumerate() {
            *slot = length_cost(literals, encoded_len as u32);
        }

        self.cost[end - 1] = literal_cost(literals, window[end - 1]);
        self.best[end - 1] = Match::default();

        for i in (start..end - 1).rev() {
            let mut best_cost = literal_cost(literals, window[i]) + self.cost[i + 1];
            let mut best_match = Match::default();

            for candidate in finder.matches_at(i) {
                if (candidate.length as usize) < MIN_MATCH {
                    break;
                }
                let offset_bits = offset_cost(offsets, candidate.offset as u32);

                let mut match_len = candidate.length as usize;
                if i + match_len > end - LAST_LITERALS {
                    // Candidates found against the full window may cross a
                    // sub-block boundary; truncate, or drop when nothing
                    // usable remains.
                    match_len = end - LAST_LITERALS - i;
                    if match_len < MIN_MATCH {
                        continue;
                    }
                }

                if (candidate.length as usize) >= LEAVE_ALONE_MATCH_SIZE {
                    let cur_cost = length_cost(literals, (match_len - MIN_MATCH) as u32)
                        + offset_bits
                        + self.cost[i + match_len];
                    if cur_cost < best_cost {
                        best_cost = cur_cost;
                        best_match = Match {
                            length: match_len as u16,
                            offset: candidate.offset,
                        };
                    }
                } else {
                    for k in (MIN_MATCH..=match_len).rev() {
                        let cur_cost =
                            cached_length_cost[k - MIN_MATCH] + offset_bits + self.cost[i + k];
                        if cur_cost < best_cost {
                            best_cost = cur_cost;
                            best_match = Match {
                                length: k as u16,
                                offset: candidate.offset,
                            };
                        }
                    }
                }
            }

            self.cost[i] = best_cost;
            self.best[i] = best_match;
        }
    }

    /// The chosen step at `position` (length 0 = literal).
    #[inline]
    pub fn best_at(&self, position: usize) -> Match {
        self.best[position]
    }

    /// Downgrade a match to literals in the final parse.
    pub(crate) fn clear_match(&mut self, start: usize, length: usize) {
        for step in &mut self.best[start..start + length] {
            *step = Match::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{fixed_distance_lengths, fixed_litlen_lengths, NLITERALSYMS, NOFFSETSYMS};

    fn static_encoders() -> (HuffmanEncoder, HuffmanEncoder) {
        let mut literals = HuffmanEncoder::new(NLITERALSYMS, 15, 0);
        for (symbol, &len) in fixed_litlen_lengths().iter().enumerate() {
            literals.code_length[symbol] = len;
        }
        let mut offsets = HuffmanEncoder::new(NOFFSETSYMS, 15, 0);
        for (symbol, &len) in fixed_distance_lengths().iter().enumerate() {
            offsets.code_length[symbol] = len;
        }
        (literals, offsets)
    }

    fn parse(window: &[u8]) -> (OptimalParser, usize) {
        let (literals, offsets) = static_encoders();
        let mut finder = MatchFinder::new(window.len());
        finder.build(window);
        finder.find_all(0, window.len());

        let mut parser = OptimalParser::new(window.len());
        parser.optimize(window, &finder, &literals, &offsets, 0, window.len());
        (parser, window.len())
    }

    /// Walk the parse and return (bytes consumed, match count).
    fn walk(parser: &OptimalParser, end: usize) -> (usize, usize) {
        let mut i = 0;
        let mut matches = 0;
        while i < end {
            let step = parser.best_at(i);
            if (step.length as usize) >= MIN_MATCH {
                matches += 1;
                i += step.length as usize;
            } else {
                i += 1;
            }
        }
        (i, matches)
    }

    #[test]
    fn test_parse_consumes_exactly_the_block() {
        for window in [
            b"the quick brown fox jumps over the lazy dog".to_vec(),
            b"abcabcabcabcabcabcabcabcabc".to_vec(),
            vec![7u8; 500],
            (0u8..=255).collect::<Vec<u8>>(),
        ] {
            let (parser, end) = parse(&window);
            let (consumed, _) = walk(&parser, end);
            assert_eq!(consumed, end);
        }
    }

    #[test]
    fn test_repetitive_input_selects_matches() {
        let window = b"abcdefgh".repeat(50);
        let (parser, end) = parse(&window);
        let (_, matches) = walk(&parser, end);
        assert!(matches > 0, "expected matches on repetitive input");
    }

    #[test]
    fn test_incompressible_input_is_all_literals() {
        let window: Vec<u8> = (0u8..=255).collect();
        let (parser, end) = parse(&window);
        let (_, matches) = walk(&parser, end);
        assert_eq!(matches, 0);
    }

    #[test]
    fn test_parsed_matches_are_valid_references() {
        let window = b"hello hello hello world world world hello world".to_vec();
        let (parser, end) = parse(&window);

        let mut i = 0;
        while i < end {
            let step = parser.best_at(i);
            if (step.length as usize) >= MIN_MATCH {
                let length = step.length as usize;
                let offset = step.offset as usize;
                assert!(offset <= i);
                assert_eq!(
                    &window[i..i + length],
                    &window[i - offset..i - offset + length]
                );
                i += length;
            } else {
                i += 1;
            }
        }
    }

    #[test]
    fn test_cheaper_than_all_literals() {
        let window = b"compression compression compression".to_vec();
        let (literals, offsets) = static_encoders();
        let mut finder = MatchFinder::new(window.len());
        finder.build(&window);
        finder.find_all(0, window.len());

        let mut parser = OptimalParser::new(window.len());
        parser.optimize(&window, &finder, &literals, &offsets, 0, window.len());

        let all_literals: u32 = window.iter().map(|&b| literal_cost(&literals, b)).sum();
        assert!(parser.cost[0] < all_literals);
    }
}
