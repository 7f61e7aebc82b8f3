//! Per-block encoding: table construction, cost evaluation, emission.
//!
//! For every sub-block the stream driver asks two questions: static or
//! dynamic tables, and did the compressed form actually beat the raw
//! bytes. This module answers the first and produces the compressed
//! candidate; the driver keeps it or rewinds to stored blocks.
//!
//! The dynamic path is a fixed-point iteration: the optimal parse depends
//! on the code lengths, which depend on the symbol frequencies, which
//! depend on the parse. Frequencies are seeded from a greedy parse,
//! tables built, and the parse/recount/rebuild cycle repeated a few times.
//! Before each parse, symbols the previous table dropped get a plausible
//! default length so the parser may still reach for them; the final build
//! prunes whatever stayed unused.

use crate::huffman::{self, HuffmanEncoder, MAX_CODES_MASK};
use crate::matchfinder::MatchFinder;
use crate::optimal::{length_cost, literal_cost, offset_cost, OptimalParser};
use crate::tables::{
    length_parts, length_symbol, offset_parts, offset_symbol, DISTANCE_CODE_EXTRA,
    LENGTH_CODE_EXTRA, LENGTH_SYMBOL_START, MAX_OFFSET, MIN_MATCH, MIN_OFFSET, NCODELENBITS,
    NCODELENSYMS, NLITERALSYMS, NOFFSETSYMS, NVALIDLITERALSYMS, NVALIDOFFSETSYMS,
};
use ferroflate_core::bitstream::BitWriter;
use ferroflate_core::error::{FerroflateError, Result};

/// Extra convergence passes after the initial greedy-seeded parse.
const CONVERGENCE_PASSES: usize = 3;

/// Default code length assumed for literal/length symbols the current
/// table left out, so the parser can still consider them.
const IMPLIED_LITERAL_LENGTH: u32 = 9;

/// Default code length assumed for unused distance symbols.
const IMPLIED_DISTANCE_LENGTH: u32 = 6;

/// Reset both encoders and seed their frequencies from a greedy
/// longest-match walk of `window[start..end)`.
///
/// The greedy walk decides per position, so restarting it at any token
/// boundary reproduces the tokens a longer walk would have produced
/// there; the block splitter relies on this to account sub-ranges.
pub(crate) fn prepare_cost_evaluation(
    window: &[u8],
    finder: &MatchFinder,
    literals: &mut HuffmanEncoder,
    offsets: &mut HuffmanEncoder,
    start: usize,
    end: usize,
) {
    *literals = HuffmanEncoder::new(NLITERALSYMS, 15, 0);
    *offsets = HuffmanEncoder::new(NOFFSETSYMS, 15, 0);
    seed_greedy_entropy(window, finder, literals, offsets, start, end);
}

/// Accumulate frequencies from a greedy longest-match walk.
pub(crate) fn seed_greedy_entropy(
    window: &[u8],
    finder: &MatchFinder,
    literals: &mut HuffmanEncoder,
    offsets: &mut HuffmanEncoder,
    start: usize,
    end: usize,
) {
    let mut i = start;
    while i < end {
        let head = finder.matches_at(i)[0];
        if (head.length as usize) >= MIN_MATCH {
            let encoded_len = head.length as u32 - MIN_MATCH as u32;
            literals.add_entropy(length_symbol(encoded_len) as usize);
            offsets.add_entropy(offset_symbol(head.offset as u32) as usize);
            i += head.length as usize;
        } else {
            literals.add_entropy(window[i] as usize);
            i += 1;
        }
    }
    literals.add_entropy(crate::tables::EOB_SYMBOL);
}

/// Accumulate frequencies from the optimal parse in `parser`.
fn count_parse_entropy(
    window: &[u8],
    parser: &OptimalParser,
    literals: &mut HuffmanEncoder,
    offsets: &mut HuffmanEncoder,
    start: usize,
    end: usize,
) {
    let mut i = start;
    while i < end {
        let step = parser.best_at(i);
        if (step.length as usize) >= MIN_MATCH {
            let encoded_len = step.length as u32 - MIN_MATCH as u32;
            literals.add_entropy(length_symbol(encoded_len) as usize);
            offsets.add_entropy(offset_symbol(step.offset as u32) as usize);
            i += step.length as usize;
        } else {
            literals.add_entropy(window[i] as usize);
            i += 1;
        }
    }
    literals.add_entropy(crate::tables::EOB_SYMBOL);
}

/// Estimated bit cost of the accumulated frequencies under the fixed
/// RFC 1951 tables, including the 3-bit block header.
pub(crate) fn evaluate_static_cost(literals: &HuffmanEncoder, offsets: &HuffmanEncoder) -> u32 {
    let static_lengths = crate::tables::fixed_litlen_lengths();
    let mut cost = 3u32;

    for symbol in 0..LENGTH_SYMBOL_START {
        cost += literals.entropy[symbol] * static_lengths[symbol];
    }
    for symbol in LENGTH_SYMBOL_START..LENGTH_SYMBOL_START + 29 {
        cost += literals.entropy[symbol]
            * (static_lengths[symbol] + LENGTH_CODE_EXTRA[symbol - LENGTH_SYMBOL_START] as u32);
    }
    for symbol in 0..NOFFSETSYMS {
        let extra = if symbol < NVALIDOFFSETSYMS {
            DISTANCE_CODE_EXTRA[symbol] as u32
        } else {
            0
        };
        cost += offsets.entropy[symbol] * (5 + extra);
    }
    cost
}

/// Estimated bit cost of the accumulated frequencies under the encoders'
/// current dynamic code lengths, including the table transmission and the
/// 3-bit block header.
pub(crate) fn evaluate_dynamic_cost(literals: &HuffmanEncoder, offsets: &HuffmanEncoder) -> u32 {
    let mut cost = 3u32;

    for symbol in 0..LENGTH_SYMBOL_START {
        cost += literals.entropy[symbol] * literals.code_length[symbol];
    }
    for symbol in LENGTH_SYMBOL_START..LENGTH_SYMBOL_START + 29 {
        cost += literals.entropy[symbol]
            * (literals.code_length[symbol]
                + LENGTH_CODE_EXTRA[symbol - LENGTH_SYMBOL_START] as u32);
    }
    for symbol in 0..NOFFSETSYMS {
        let extra = if symbol < NVALIDOFFSETSYMS {
            DISTANCE_CODE_EXTRA[symbol] as u32
        } else {
            0
        };
        cost += offsets.entropy[symbol] * (offsets.code_length[symbol] + extra);
    }

    // Table transmission: HLIT/HDIST/HCLEN fields, the raw code-length
    // table, and the RLE-coded symbol-length sequences.
    let combined = combined_lengths(literals, offsets);

    let mut tables = HuffmanEncoder::new(NCODELENSYMS, 7, 0);
    tables.update_lengths_entropy(&combined, MAX_CODES_MASK);
    tables.estimate_dynamic_codelens();

    cost += 5 + 5 + 4;
    cost += NCODELENBITS * tables.raw_table_size() as u32;
    cost += tables.lengths_cost(&combined, MAX_CODES_MASK);

    cost
}

/// Concatenate the transmitted prefix of both length tables.
fn combined_lengths(literals: &HuffmanEncoder, offsets: &HuffmanEncoder) -> Vec<u32> {
    let literal_count = literals.defined_symbol_count(257);
    let offset_count = offsets.defined_symbol_count(1);
    let mut combined = Vec::with_capacity(literal_count + offset_count);
    combined.extend_from_slice(&literals.code_length[..literal_count]);
    combined.extend_from_slice(&offsets.code_length[..offset_count]);
    combined
}

/// Emit a match length: the length symbol, then its extra bits.
fn write_length(
    literals: &HuffmanEncoder,
    writer: &mut BitWriter,
    encoded_len: u32,
) -> Result<()> {
    let (symbol, extra_bits, disp) = length_parts(encoded_len);
    literals.write_codeword(symbol as usize, writer)?;
    writer.put_bits(disp as u32, extra_bits as u32)
}

/// Emit a match offset: the distance symbol, then its extra bits.
fn write_offset(offsets: &HuffmanEncoder, writer: &mut BitWriter, offset: u32) -> Result<()> {
    let (symbol, extra_bits, disp) = offset_parts(offset);
    offsets.write_codeword(symbol as usize, writer)?;
    writer.put_bits(disp as u32, extra_bits as u32)
}

/// Walk the final parse and downgrade any match whose emission costs more
/// than spelling out its bytes as literals (only when every such literal
/// still has a defined code length).
fn post_optimize(
    window: &[u8],
    parser: &mut OptimalParser,
    literals: &HuffmanEncoder,
    offsets: &HuffmanEncoder,
    start: usize,
    end: usize,
) {
    let mut i = start;
    while i < end {
        let step = parser.best_at(i);
        if (step.length as usize) < MIN_MATCH {
            i += 1;
            continue;
        }

        let match_start = i;
        let match_len = step.length as usize;
        i += match_len;

        let offset = step.offset as usize;
        if !(MIN_OFFSET..=MAX_OFFSET).contains(&offset) {
            continue;
        }

        let match_cost = length_cost(literals, (match_len - MIN_MATCH) as u32)
            + offset_cost(offsets, offset as u32);

        let mut literals_cost = 0u32;
        let mut usable = true;
        for j in 0..match_len {
            let cost = literal_cost(literals, window[match_start + j]);
            if cost == 0 {
                // That byte's symbol was pruned from the table
                usable = false;
                break;
            }
            literals_cost += cost;
            if literals_cost >= match_cost {
                break;
            }
        }

        if usable && literals_cost < match_cost {
            parser.clear_match(match_start, match_len);
        }
    }
}

/// Emit the parse as codewords, terminated by the end-of-block symbol.
fn write_block_body(
    window: &[u8],
    parser: &OptimalParser,
    literals: &HuffmanEncoder,
    offsets: &HuffmanEncoder,
    writer: &mut BitWriter,
    start: usize,
    end: usize,
) -> Result<()> {
    let mut i = start;
    while i < end {
        let step = parser.best_at(i);
        if (step.length as usize) >= MIN_MATCH {
            let offset = step.offset as usize;
            if !(MIN_OFFSET..=MAX_OFFSET).contains(&offset) {
                return Err(FerroflateError::compression(format!(
                    "match offset {offset} outside the window"
                )));
            }
            write_length(literals, writer, step.length as u32 - MIN_MATCH as u32)?;
            write_offset(offsets, writer, step.offset as u32)?;
            i += step.length as usize;
        } else {
            literals.write_codeword(window[i] as usize, writer)?;
            i += 1;
        }
    }
    if i != end {
        return Err(FerroflateError::compression(format!(
            "parse consumed {} bytes past the block end",
            i - end
        )));
    }
    literals.write_codeword(crate::tables::EOB_SYMBOL, writer)
}

/// Ensure at least two distance symbols carry frequency before the final
/// table build. Dynamic blocks advertising fewer tripped a bug in old
/// inflate implementations, so complete streams never do.
fn patch_distance_entropy(offsets: &mut HuffmanEncoder) {
    let used = offsets.entropy[..NVALIDOFFSETSYMS]
        .iter()
        .filter(|&&count| count != 0)
        .take(2)
        .count();
    if used == 0 {
        offsets.entropy[0] = 1;
        offsets.entropy[1] = 1;
    } else if used == 1 {
        if offsets.entropy[0] != 0 {
            offsets.entropy[1] = 1;
        } else {
            offsets.entropy[0] = 1;
        }
    }
}

/// Compress `window[start..start+size)` into `writer`, assuming the
/// BFINAL/BTYPE bits are already written.
///
/// With `is_dynamic` false, the fixed RFC 1951 tables are used and the
/// parse is optimized once against them. With it true, the convergence
/// loop runs, the tables are RLE-tuned and transmitted, then the body
/// follows. Errors include the bit writer running out of room, which the
/// caller treats as "not compressible" and answers with stored blocks.
#[allow(clippy::too_many_arguments)]
pub(crate) fn block_deflate(
    window: &[u8],
    finder: &MatchFinder,
    parser: &mut OptimalParser,
    literals: &mut HuffmanEncoder,
    offsets: &mut HuffmanEncoder,
    writer: &mut BitWriter,
    start: usize,
    size: usize,
    is_dynamic: bool,
) -> Result<()> {
    let end = start + size;
    *literals = HuffmanEncoder::new(NLITERALSYMS, 15, 0);
    *offsets = HuffmanEncoder::new(NOFFSETSYMS, 15, 0);

    if !is_dynamic {
        let static_lengths = crate::tables::fixed_litlen_lengths();
        literals.code_length[..NLITERALSYMS].copy_from_slice(&static_lengths);
        offsets.code_length[..NOFFSETSYMS]
            .copy_from_slice(&crate::tables::fixed_distance_lengths());
        literals.build_static_codewords();
        offsets.build_static_codewords();

        parser.optimize(window, finder, literals, offsets, start, end);
    } else {
        // Seed with greedy frequencies and build tentative tables.
        seed_greedy_entropy(window, finder, literals, offsets, start, end);
        literals.build_dynamic_codewords();
        offsets.build_dynamic_codewords();

        for pass in 0..=CONVERGENCE_PASSES {
            // Revive pruned symbols so the parser may reconsider them.
            for length in literals.code_length[..NLITERALSYMS].iter_mut() {
                if *length == 0 {
                    *length = IMPLIED_LITERAL_LENGTH;
                }
            }
            for length in offsets.code_length[..NOFFSETSYMS].iter_mut() {
                if *length == 0 {
                    *length = IMPLIED_DISTANCE_LENGTH;
                }
            }

            parser.optimize(window, finder, literals, offsets, start, end);

            literals.reset_entropy();
            offsets.reset_entropy();
            count_parse_entropy(window, parser, literals, offsets, start, end);

            if pass == CONVERGENCE_PASSES {
                patch_distance_entropy(offsets);
            }

            literals.build_dynamic_codewords();
            offsets.build_dynamic_codewords();
        }

        post_optimize(window, parser, literals, offsets, start, end);

        // Speculative RLE tuning: smooth the frequency histograms so the
        // length tables compress better, keep the result only if the
        // total estimated cost actually drops.
        let mut tuned_literals = literals.clone();
        let mut tuned_offsets = offsets.clone();
        let current_cost = evaluate_dynamic_cost(literals, offsets);
        huffman::optimize_for_rle(&mut tuned_literals.entropy[..NLITERALSYMS]);
        huffman::optimize_for_rle(&mut tuned_offsets.entropy[..NOFFSETSYMS]);
        tuned_literals.build_dynamic_codewords();
        tuned_offsets.build_dynamic_codewords();
        if evaluate_dynamic_cost(&tuned_literals, &tuned_offsets) < current_cost {
            *literals = tuned_literals;
            *offsets = tuned_offsets;
        }

        let literal_count = literals.defined_symbol_count(257);
        let offset_count = offsets.defined_symbol_count(1);
        let combined = combined_lengths(literals, offsets);

        // Search the RLE enablement masks for the cheapest table coding:
        // 0..=7, then only odd masks with the repeat code enabled.
        let mut tables = HuffmanEncoder::new(NCODELENSYMS, 7, 0);
        let mut best_mask = 0;
        let mut best_cost = u32::MAX;
        let mut mask = 0;
        while mask <= MAX_CODES_MASK {
            tables.update_lengths_entropy(&combined, mask);
            tables.build_dynamic_codewords();

            let table_cost = tables.lengths_cost(&combined, mask);
            if table_cost <= best_cost {
                best_mask = mask;
                best_cost = table_cost;
            }

            tables.reset_entropy();
            mask = if mask >= 7 { mask + 2 } else { mask + 1 };
        }

        tables.update_lengths_entropy(&combined, best_mask);
        tables.build_dynamic_codewords();

        let codelen_count = tables.raw_table_size();
        if literal_count > NVALIDLITERALSYMS || offset_count > NVALIDOFFSETSYMS {
            return Err(FerroflateError::compression(
                "dynamic table exceeds the valid symbol range",
            ));
        }

        writer.put_bits(literal_count as u32 - 257, 5)?;
        writer.put_bits(offset_count as u32 - 1, 5)?;
        writer.put_bits(codelen_count as u32 - 4, 4)?;
        tables.write_raw_table(NCODELENBITS, codelen_count, writer)?;
        tables.write_lengths(&combined, best_mask, writer)?;
    }

    write_block_body(window, parser, literals, offsets, writer, start, end)
}
