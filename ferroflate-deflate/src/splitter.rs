//! Block splitting: finding positions where new Huffman tables pay off.
//!
//! A block whose first half is XML and second half is pixel data wastes
//! bits if one table serves both. The splitter walks the greedy token
//! stream accumulating a cheap 18-feature histogram (16 literal buckets
//! from two high and two low bits of the byte, one bucket each for short
//! and long matches). When the distribution of newly arrived tokens
//! drifts far enough from the accumulated one, the last known-good
//! boundary becomes a split candidate, and the candidate is accepted only
//! if encoding left and right with their own dynamic tables is estimated
//! cheaper than one table for the whole range. Both sides then recurse.
//!
//! Histograms are compared, not encodings: the expensive cost evaluation
//! runs only on drift, which is what makes the splitter affordable.

use crate::block::{evaluate_dynamic_cost, prepare_cost_evaluation};
use crate::huffman::HuffmanEncoder;
use crate::matchfinder::MatchFinder;
use crate::tables::{EOB_SYMBOL, MIN_MATCH, NLITERALSYMS, NOFFSETSYMS};

/// Maximum number of sub-blocks one input block may be divided into.
pub const MAX_SPLITS: usize = 64;

/// Recursion floor: ranges smaller than this are never split.
const MIN_SPLIT_SIZE: usize = 8192;

/// Maximum recursion depth.
const MAX_SPLIT_DEPTH: usize = 6;

/// Number of chunk-histogram features.
const NFEATURES: usize = 18;

/// Minimum features accumulated per chunk before a drift check.
const MIN_CHUNK_FEATURES: u32 = 256;

/// Minimum byte span per chunk before a drift check.
const MIN_CHUNK_BYTES: usize = 512;

/// Feature bucket for a literal byte: bits 6-7 and bits 0-1.
#[inline]
fn literal_feature(byte: u8) -> usize {
    (((byte >> 4) & 0xC) | (byte & 0x3)) as usize
}

/// Find split points for `window[start..start+size)`.
///
/// Returns the ordered list of split offsets (window coordinates), always
/// terminated by `start + size`, holding at most [`MAX_SPLITS`] entries.
/// The encoders are used as scratch for the cost evaluations.
pub fn block_split(
    window: &[u8],
    finder: &MatchFinder,
    literals: &mut HuffmanEncoder,
    offsets: &mut HuffmanEncoder,
    start: usize,
    size: usize,
) -> Vec<usize> {
    let mut splits = Vec::new();
    split_recursive(
        window,
        finder,
        literals,
        offsets,
        start,
        size,
        0,
        MAX_SPLITS - 1,
        &mut splits,
    );
    splits.push(start + size);
    splits
}

/// Recursive worker; appends interior split offsets in ascending order.
#[allow(clippy::too_many_arguments)]
fn split_recursive(
    window: &[u8],
    finder: &MatchFinder,
    literals: &mut HuffmanEncoder,
    offsets: &mut HuffmanEncoder,
    start: usize,
    size: usize,
    depth: usize,
    max_splits: usize,
    splits: &mut Vec<usize>,
) {
    if splits.len() >= max_splits || depth >= MAX_SPLIT_DEPTH || size < MIN_SPLIT_SIZE {
        return;
    }

    // Cost of the whole range under one dynamic table, from greedy
    // frequencies. The same greedy walk drives the feature histogram.
    prepare_cost_evaluation(window, finder, literals, offsets, start, start + size);
    literals.estimate_dynamic_codelens();
    offsets.estimate_dynamic_codelens();
    let total_cost = evaluate_dynamic_cost(literals, offsets) as i64;

    let total_literals = literals.clone();
    let total_offsets = offsets.clone();
    let mut left_literals = HuffmanEncoder::new(NLITERALSYMS, 15, 0);
    let mut left_offsets = HuffmanEncoder::new(NOFFSETSYMS, 15, 0);
    let mut right_literals = HuffmanEncoder::new(NLITERALSYMS, 15, 0);
    let mut right_offsets = HuffmanEncoder::new(NOFFSETSYMS, 15, 0);

    let mut stat = [0u32; NFEATURES];
    let mut new_stat = [0u32; NFEATURES];
    let mut num_stats = 0u32;
    let mut num_new_stats = 0u32;

    let end = start + size;
    let mut last_left_end = start;
    let mut last_good_split: Option<usize> = None;
    let mut best_split = end;
    let mut best_delta = 0i64;

    let mut i = start;
    while i < end {
        let head = finder.matches_at(i)[0];
        if (head.length as usize) >= MIN_MATCH {
            if head.length >= 9 {
                new_stat[17] += 1;
            } else {
                new_stat[16] += 1;
            }
            num_new_stats += 1;
            i += head.length as usize;
        } else {
            new_stat[literal_feature(window[i])] += 1;
            num_new_stats += 1;
            i += 1;
        }

        if num_new_stats < MIN_CHUNK_FEATURES || i - start < MIN_CHUNK_BYTES {
            continue;
        }

        if num_stats > 0 {
            // Proportional distance between the accumulated distribution
            // and this chunk's.
            let mut total_delta = 0u64;
            for j in 0..NFEATURES {
                let expected = stat[j] as u64 * num_new_stats as u64;
                let actual = new_stat[j] as u64 * num_stats as u64;
                total_delta += expected.abs_diff(actual);
            }

            let drifted =
                total_delta / num_new_stats as u64 >= (num_stats as u64) * 45 / 100;

            if drifted {
                if let Some(candidate) = last_good_split {
                    // Account only the tokens between the previous stop
                    // and the candidate, extending the accumulated left
                    // frequencies; the right side is the total minus the
                    // left. Candidates sit on token boundaries, so the
                    // sums match a full rescan.
                    prepare_cost_evaluation(
                        window,
                        finder,
                        literals,
                        offsets,
                        last_left_end,
                        candidate,
                    );
                    for j in 0..NLITERALSYMS {
                        left_literals.entropy[j] += literals.entropy[j];
                    }
                    for j in 0..NOFFSETSYMS {
                        left_offsets.entropy[j] += offsets.entropy[j];
                    }
                    // One end-of-block marker per side, not one per probe
                    left_literals.entropy[EOB_SYMBOL] = 1;

                    for j in 0..NLITERALSYMS {
                        right_literals.entropy[j] =
                            total_literals.entropy[j] - left_literals.entropy[j];
                    }
                    for j in 0..NOFFSETSYMS {
                        right_offsets.entropy[j] =
                            total_offsets.entropy[j] - left_offsets.entropy[j];
                    }
                    right_literals.entropy[EOB_SYMBOL] = 1;

                    left_literals.estimate_dynamic_codelens();
                    left_offsets.estimate_dynamic_codelens();
                    let left_cost = evaluate_dynamic_cost(&left_literals, &left_offsets) as i64;

                    right_literals.estimate_dynamic_codelens();
                    right_offsets.estimate_dynamic_codelens();
                    let right_cost =
                        evaluate_dynamic_cost(&right_literals, &right_offsets) as i64;

                    let delta = total_cost - (left_cost + right_cost);
                    if delta >= 0 && (best_split == end || best_delta < delta) {
                        best_split = candidate;
                        best_delta = delta;
                    }

                    last_left_end = candidate;
                }
            }
        }

        for j in 0..NFEATURES {
            num_stats += new_stat[j];
            stat[j] += new_stat[j];
            new_stat[j] = 0;
        }
        num_new_stats = 0;
        last_good_split = Some(i);
    }

    if best_split != end {
        split_recursive(
            window,
            finder,
            literals,
            offsets,
            start,
            best_split - start,
            depth + 1,
            max_splits,
            splits,
        );
        if splits.len() < max_splits {
            splits.push(best_split);
        }
        split_recursive(
            window,
            finder,
            literals,
            offsets,
            best_split,
            end - best_split,
            depth + 1,
            max_splits,
            splits,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(window: &[u8]) -> Vec<usize> {
        let mut finder = MatchFinder::new(window.len());
        finder.build(window);
        finder.find_all(0, window.len());
        let mut literals = HuffmanEncoder::new(NLITERALSYMS, 15, 0);
        let mut offsets = HuffmanEncoder::new(NOFFSETSYMS, 15, 0);
        block_split(
            window,
            &mut finder,
            &mut literals,
            &mut offsets,
            0,
            window.len(),
        )
    }

    #[test]
    fn test_small_block_is_never_split() {
        let window = vec![b'x'; 4096];
        assert_eq!(split(&window), vec![4096]);
    }

    #[test]
    fn test_splits_end_with_block_end() {
        let window = b"lorem ipsum dolor sit amet ".repeat(2000);
        let splits = split(&window);
        assert_eq!(*splits.last().unwrap(), window.len());
        assert!(splits.len() <= MAX_SPLITS);
        assert!(splits.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_heterogeneous_data_gets_split() {
        // Two starkly different halves: ASCII text vs. a dense byte ramp.
        let mut window = b"the quick brown fox jumps over the lazy dog ".repeat(700);
        let text_len = window.len();
        for i in 0..text_len {
            window.push((i * 7) as u8);
        }

        let splits = split(&window);
        assert!(
            splits.len() >= 2,
            "expected at least one interior split, got {splits:?}"
        );
        // Some split should land near the texture change.
        let boundary = text_len as i64;
        assert!(
            splits[..splits.len() - 1]
                .iter()
                .any(|&s| (s as i64 - boundary).abs() < 8192),
            "no split near the boundary: {splits:?}"
        );
    }

    #[test]
    fn test_uniform_data_is_rarely_split() {
        let window = vec![0xAB; 100_000];
        let splits = split(&window);
        assert_eq!(splits, vec![100_000]);
    }

    #[test]
    fn test_literal_feature_buckets() {
        assert_eq!(literal_feature(0x00), 0);
        assert_eq!(literal_feature(0x03), 3);
        assert_eq!(literal_feature(0xC0), 12);
        assert_eq!(literal_feature(0xFF), 15);
        assert_eq!(literal_feature(b'A'), 5); // 0x41: bits 6-7 -> 4, bits 0-1 -> 1
    }
}
