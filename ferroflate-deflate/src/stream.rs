//! Streaming compression driver.
//!
//! [`CompressStream`] owns every allocation a stream needs (the sliding
//! window, the match finder's index arrays, the parser's cost arrays, the
//! output bit buffer), all sized once at construction and reused for
//! every block. The caller pushes input and pulls output through
//! [`compress`], re-invoking with refilled buffers whenever either side
//! runs dry.
//!
//! Per block the driver: updates the running checksum, rebuilds the
//! suffix-array index over (history | new bytes), lets the splitter
//! partition the new bytes, encodes each sub-block (static or dynamic,
//! whichever estimates cheaper), and rewinds to stored blocks when the
//! compressed attempt fails to beat the raw bytes. Up to
//! [`HISTORY_SIZE`](crate::tables::HISTORY_SIZE) trailing bytes then slide
//! back to serve as history for the next block.
//!
//! [`compress`]: CompressStream::compress

use crate::block;
use crate::frame::{usable_dictionary, Framing};
use crate::huffman::HuffmanEncoder;
use crate::matchfinder::MatchFinder;
use crate::optimal::OptimalParser;
use crate::splitter::{self, MAX_SPLITS};
use crate::tables::{HISTORY_SIZE, NLITERALSYMS, NOFFSETSYMS};
use ferroflate_core::bitstream::BitWriter;
use ferroflate_core::error::{FerroflateError, Result};

/// Default maximum block size when 0 is passed.
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 1_048_576;

/// Smallest accepted maximum block size.
pub const MIN_BLOCK_SIZE: usize = 32_768;

/// Largest accepted maximum block size.
pub const MAX_BLOCK_SIZE: usize = 2_097_152;

/// Largest payload of one stored block (16-bit LEN field).
const MAX_STORED_BLOCK: usize = 65_535;

/// Progress report from one [`CompressStream::compress`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamProgress {
    /// Bytes consumed from the input slice.
    pub consumed: usize,
    /// Bytes written to the output slice.
    pub produced: usize,
    /// Whether the stream is complete, footer included.
    pub finished: bool,
}

/// Output buffer capacity for a given maximum block size: the worst case
/// is a stored rendition of every sub-block, each paying alignment
/// padding, a chunk header per 65535 bytes, and its BFINAL/BTYPE bits.
fn out_buffer_size(max_block_size: usize) -> usize {
    1 + max_block_size
        + (1 + 4) * (max_block_size / MAX_STORED_BLOCK + 1)
        + (1 + 4 + 1) * MAX_SPLITS
}

/// Clamp a requested maximum block size into the supported range.
fn clamp_block_size(max_block_size: usize) -> usize {
    if max_block_size == 0 {
        DEFAULT_MAX_BLOCK_SIZE
    } else {
        max_block_size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE)
    }
}

/// A streaming DEFLATE compressor with selectable framing.
///
/// # Example
///
/// ```
/// use ferroflate_deflate::{CompressStream, Framing};
///
/// let mut stream = CompressStream::new(Framing::Zlib, 0).unwrap();
/// let input = b"streaming example data";
/// let mut output = vec![0u8; 256];
/// let progress = stream.compress(input, &mut output, true).unwrap();
/// assert!(progress.finished);
/// assert_eq!(progress.consumed, input.len());
/// ```
#[derive(Debug)]
pub struct CompressStream {
    framing: Framing,
    max_block_size: usize,

    /// Input window: HISTORY_SIZE history bytes, then the new bytes.
    window: Vec<u8>,
    /// New bytes accumulated for the current block.
    cur_in_bytes: usize,
    /// History bytes available from the previous block (or dictionary).
    previous_block_size: usize,
    /// Preset dictionary staged until the first block.
    dictionary: Option<Vec<u8>>,

    finder: MatchFinder,
    parser: OptimalParser,
    literals: HuffmanEncoder,
    offsets: HuffmanEncoder,

    /// Compressed output staging buffer.
    writer: BitWriter,
    cur_out_index: usize,
    pending_out_bytes: usize,

    /// Framing header/footer staging.
    frame_buffer: Vec<u8>,
    cur_frame_index: usize,

    header_emitted: bool,
    finalized: bool,
    footer_emitted: bool,
    poisoned: bool,

    checksum: u32,
    total_in: u64,
    total_out: u64,
}

impl CompressStream {
    /// Create a stream. `max_block_size` of 0 selects the default
    /// (1 MiB); other values are clamped to [32768, 2097152].
    pub fn new(framing: Framing, max_block_size: usize) -> Result<Self> {
        let max_block_size = clamp_block_size(max_block_size);
        let max_window_size = HISTORY_SIZE + max_block_size;

        Ok(Self {
            framing,
            max_block_size,
            window: vec![0u8; max_window_size],
            cur_in_bytes: 0,
            previous_block_size: 0,
            dictionary: None,
            finder: MatchFinder::new(max_window_size),
            parser: OptimalParser::new(max_window_size),
            literals: HuffmanEncoder::new(NLITERALSYMS, 15, 0),
            offsets: HuffmanEncoder::new(NOFFSETSYMS, 15, 0),
            writer: BitWriter::new(out_buffer_size(max_block_size)),
            cur_out_index: 0,
            pending_out_bytes: 0,
            frame_buffer: Vec::new(),
            cur_frame_index: 0,
            header_emitted: false,
            finalized: false,
            footer_emitted: false,
            poisoned: false,
            checksum: 0,
            total_in: 0,
            total_out: 0,
        })
    }

    /// Set a preset dictionary. Only valid with zlib framing, and only
    /// before any input has been consumed. Dictionaries longer than the
    /// 32 KiB window are truncated to their trailing bytes, per RFC 1950.
    pub fn set_dictionary(&mut self, dictionary: &[u8]) -> Result<()> {
        if self.framing != Framing::Zlib {
            return Err(FerroflateError::dictionary(
                "preset dictionaries require zlib framing",
            ));
        }
        if self.header_emitted || self.total_in > 0 || self.cur_in_bytes > 0 {
            return Err(FerroflateError::dictionary(
                "dictionary must be set before any input",
            ));
        }
        self.dictionary = Some(usable_dictionary(dictionary).to_vec());
        Ok(())
    }

    /// Total uncompressed bytes consumed so far.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Total compressed bytes produced so far.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Running checksum over the consumed input (Adler-32 for zlib,
    /// CRC-32 for gzip, 0 for raw deflate).
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Push input and pull output. Consumes from `input`, writes into
    /// `output`, and returns when either is exhausted (or, with
    /// `finalize`, when the stream completes). Pass `finalize` once the
    /// final bytes of the stream are in `input`; keep calling with empty
    /// input until `finished` is reported if the output buffer fills up.
    pub fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        finalize: bool,
    ) -> Result<StreamProgress> {
        if self.poisoned {
            return Err(FerroflateError::compression(
                "stream previously failed and must be torn down",
            ));
        }

        let mut in_pos = 0usize;
        let mut out_pos = 0usize;

        let result = self.run(input, &mut in_pos, output, &mut out_pos, finalize);
        if result.is_err() {
            self.poisoned = true;
        }
        result?;

        Ok(StreamProgress {
            consumed: in_pos,
            produced: out_pos,
            finished: self.footer_emitted && self.pending_frame_bytes() == 0,
        })
    }

    fn pending_frame_bytes(&self) -> usize {
        self.frame_buffer.len() - self.cur_frame_index
    }

    /// Copy staged framing bytes into the output.
    fn drain_frame(&mut self, output: &mut [u8], out_pos: &mut usize) {
        let pending = self.pending_frame_bytes();
        if pending == 0 || *out_pos >= output.len() {
            return;
        }
        let n = pending.min(output.len() - *out_pos);
        output[*out_pos..*out_pos + n]
            .copy_from_slice(&self.frame_buffer[self.cur_frame_index..self.cur_frame_index + n]);
        self.cur_frame_index += n;
        *out_pos += n;
        self.total_out += n as u64;
    }

    /// Copy staged compressed bytes into the output.
    fn drain_out(&mut self, output: &mut [u8], out_pos: &mut usize) {
        if self.pending_out_bytes == 0 || *out_pos >= output.len() {
            return;
        }
        let n = self.pending_out_bytes.min(output.len() - *out_pos);
        // The staged bytes sit in the writer's buffer even though its
        // offset was rewound for the next block.
        output[*out_pos..*out_pos + n].copy_from_slice(
            &self.writer.buffer()[self.cur_out_index..self.cur_out_index + n],
        );
        self.cur_out_index += n;
        self.pending_out_bytes -= n;
        *out_pos += n;
        self.total_out += n as u64;
    }

    fn run(
        &mut self,
        input: &[u8],
        in_pos: &mut usize,
        output: &mut [u8],
        out_pos: &mut usize,
        finalize: bool,
    ) -> Result<()> {
        loop {
            if !self.header_emitted {
                self.header_emitted = true;
                self.frame_buffer = self
                    .framing
                    .encode_header(self.dictionary.as_deref())?;
                self.cur_frame_index = 0;
                self.checksum = self.framing.init_checksum();
            }
            self.drain_frame(output, out_pos);

            // A dictionary becomes the initial history before any block.
            if self.previous_block_size == 0 {
                if let Some(dictionary) = self.dictionary.take() {
                    let len = dictionary.len();
                    self.window[HISTORY_SIZE - len..HISTORY_SIZE].copy_from_slice(&dictionary);
                    self.previous_block_size = len;
                }
            }

            if self.pending_frame_bytes() == 0 && self.pending_out_bytes == 0 && !self.finalized {
                // Accumulate input into the new-bytes region.
                let room = self.max_block_size - self.cur_in_bytes;
                let n = room.min(input.len() - *in_pos);
                self.window[HISTORY_SIZE + self.cur_in_bytes..HISTORY_SIZE + self.cur_in_bytes + n]
                    .copy_from_slice(&input[*in_pos..*in_pos + n]);
                *in_pos += n;
                self.cur_in_bytes += n;
                self.total_in += n as u64;

                let block_ready =
                    self.cur_in_bytes >= self.max_block_size && *in_pos < input.len();
                if block_ready || finalize {
                    let size = self.cur_in_bytes;
                    if size > 0 {
                        self.process_block(size, finalize, input.len() - *in_pos)?;
                    } else if finalize {
                        // Empty stream: a single empty stored block so the
                        // output still contains one final block.
                        self.writer.put_bits(1, 1)?;
                        self.writer.put_bits(0, 2)?;
                        self.writer.flush_bits()?;
                        self.writer.write_bytes(&[0x00, 0x00, 0xFF, 0xFF])?;
                        self.stage_output()?;
                        self.finalized = true;
                    }
                }
            }

            self.drain_out(output, out_pos);

            if self.pending_frame_bytes() == 0
                && self.pending_out_bytes == 0
                && self.finalized
                && !self.footer_emitted
            {
                self.frame_buffer = self.framing.encode_footer(self.checksum, self.total_in);
                self.cur_frame_index = 0;
                self.footer_emitted = true;
            }
            self.drain_frame(output, out_pos);

            // Yield when a buffer runs dry; a finalized stream consumes
            // no further input, so it must not wait for any.
            if *in_pos >= input.len() || *out_pos >= output.len() || self.finalized {
                return Ok(());
            }
        }
    }

    /// Move the staged compressed bytes into the drain cycle and rewind
    /// the writer's byte offset (pending bits carry into the next block).
    fn stage_output(&mut self) -> Result<()> {
        self.cur_out_index = 0;
        self.pending_out_bytes = self.writer.offset()?;
        self.writer.set_offset(0)?;
        Ok(())
    }

    /// Compress one full block of `size` new bytes.
    fn process_block(&mut self, size: usize, finalize: bool, input_remaining: usize) -> Result<()> {
        // The checksum covers input bytes in order, before indexing.
        self.checksum = self
            .framing
            .update_checksum(self.checksum, &self.window[HISTORY_SIZE..HISTORY_SIZE + size]);
        self.cur_in_bytes = 0;

        let history = self.previous_block_size;
        let window_start = HISTORY_SIZE - history;
        let window = &self.window[window_start..HISTORY_SIZE + size];

        self.finder.build(window);
        if history > 0 {
            self.finder.skip(0, history);
        }
        self.finder.find_all(history, history + size);

        let splits = splitter::block_split(
            window,
            &self.finder,
            &mut self.literals,
            &mut self.offsets,
            history,
            size,
        );
        if splits.len() > MAX_SPLITS {
            return Err(FerroflateError::compression("split table overflow"));
        }

        let mut in_start = 0usize;
        let mut split_index = 0usize;
        while in_start < size {
            let block_size = splits[split_index] - (in_start + history);
            split_index += 1;

            // Choose static or dynamic from greedy-frequency estimates.
            block::prepare_cost_evaluation(
                window,
                &self.finder,
                &mut self.literals,
                &mut self.offsets,
                history + in_start,
                history + in_start + block_size,
            );
            let static_cost = block::evaluate_static_cost(&self.literals, &self.offsets);
            self.literals.estimate_dynamic_codelens();
            self.offsets.estimate_dynamic_codelens();
            let dynamic_cost = block::evaluate_dynamic_cost(&self.literals, &self.offsets);
            let is_dynamic = static_cost > dynamic_cost;

            let is_final = finalize
                && (in_start + block_size) >= size
                && input_remaining == 0;

            let checkpoint = self.writer.checkpoint();
            self.writer.put_bits(u32::from(is_final), 1)?;
            self.writer.put_bits(1 + u32::from(is_dynamic), 2)?;

            let prev_offset = self.writer.offset()?;
            let compressed = block::block_deflate(
                window,
                &self.finder,
                &mut self.parser,
                &mut self.literals,
                &mut self.offsets,
                &mut self.writer,
                history + in_start,
                block_size,
                is_dynamic,
            );

            // A failed or oversized attempt becomes stored blocks; the
            // comparison is byte counts, exactly as decoders will see it.
            let too_big = match &compressed {
                Ok(()) => self.writer.offset()? - prev_offset > block_size,
                Err(FerroflateError::Destination { .. }) => true,
                Err(_) => return compressed,
            };
            if too_big {
                self.writer.restore(checkpoint);
                let raw = &window[history + in_start..history + in_start + block_size];
                write_stored_blocks(&mut self.writer, raw, is_final)?;
            }

            in_start += block_size;
        }

        // Slide the tail of the just-compressed bytes into the history.
        self.previous_block_size = size.min(HISTORY_SIZE);
        if self.previous_block_size > 0 {
            let src = HISTORY_SIZE + size - self.previous_block_size;
            self.window
                .copy_within(src..src + self.previous_block_size, HISTORY_SIZE - self.previous_block_size);
        }

        if finalize && input_remaining == 0 {
            self.writer.flush_bits()?;
            self.finalized = true;
        }

        self.stage_output()
    }

}

/// Emit `data` as stored blocks of at most 65535 bytes each: BFINAL,
/// BTYPE=00, byte alignment, little-endian LEN and NLEN, raw bytes. Only
/// the last chunk inherits the original BFINAL.
fn write_stored_blocks(writer: &mut BitWriter, data: &[u8], is_final: bool) -> Result<()> {
    let mut remaining = data;
    while !remaining.is_empty() {
        let sub_size = remaining.len().min(MAX_STORED_BLOCK);
        let sub_final = is_final && sub_size == remaining.len();

        writer.put_bits(u32::from(sub_final), 1)?;
        writer.put_bits(0, 2)?;
        writer.flush_bits()?;

        let len = sub_size as u16;
        writer.put_bits(len as u32, 16)?;
        writer.put_bits(!len as u32, 16)?;
        writer.write_bytes(&remaining[..sub_size])?;

        remaining = &remaining[sub_size..];
    }
    Ok(())
}

/// Upper bound on the compressed size for `input_size` bytes under the
/// given framing and block size.
///
/// Covers the worst case of every sub-block of every block falling back
/// to stored form, plus framing.
pub fn compress_bound(input_size: usize, framing: Framing, max_block_size: usize) -> usize {
    let max_block_size = clamp_block_size(max_block_size);
    let blocks = (input_size.div_ceil(max_block_size)).max(1);
    let per_block_overhead =
        (1 + 4 + 1) * MAX_SPLITS + (1 + 4) * (max_block_size / MAX_STORED_BLOCK + 1);

    framing.header_size(false)
        + blocks * per_block_overhead
        + input_size
        + 1
        + framing.footer_size()
}

/// One-shot compression of `input` into a fresh buffer.
///
/// `max_block_size` follows the same rules as [`CompressStream::new`].
/// An empty input yields a valid stream that decompresses to nothing.
pub fn memory_compress(input: &[u8], framing: Framing, max_block_size: usize) -> Result<Vec<u8>> {
    let mut stream = CompressStream::new(framing, max_block_size)?;
    let mut output = vec![0u8; compress_bound(input.len(), framing, max_block_size)];

    let progress = stream.compress(input, &mut output, true)?;
    if !progress.finished || progress.consumed != input.len() {
        return Err(FerroflateError::compression(
            "one-shot compression did not run to completion",
        ));
    }
    output.truncate(progress.produced);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size_clamping() {
        assert_eq!(clamp_block_size(0), DEFAULT_MAX_BLOCK_SIZE);
        assert_eq!(clamp_block_size(1), MIN_BLOCK_SIZE);
        assert_eq!(clamp_block_size(usize::MAX), MAX_BLOCK_SIZE);
        assert_eq!(clamp_block_size(65536), 65536);
    }

    #[test]
    fn test_empty_input_produces_final_stored_block() {
        let out = memory_compress(b"", Framing::Deflate, 0).unwrap();
        // BFINAL=1, BTYPE=00, aligned, LEN=0, NLEN=0xFFFF
        assert_eq!(out, vec![0x01, 0x00, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn test_empty_zlib_stream_layout() {
        let out = memory_compress(b"", Framing::Zlib, 0).unwrap();
        assert!(out.len() >= 2 + 4);
        assert_eq!(out[0], 0x78);
        // Trailer: Adler-32 of nothing is 1, big-endian
        assert_eq!(&out[out.len() - 4..], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_dictionary_rules() {
        let mut stream = CompressStream::new(Framing::Gzip, 0).unwrap();
        assert!(stream.set_dictionary(b"abc").is_err());

        let mut stream = CompressStream::new(Framing::Zlib, 0).unwrap();
        assert!(stream.set_dictionary(b"abc").is_ok());

        let mut output = vec![0u8; 128];
        stream.compress(b"abcabc", &mut output, true).unwrap();
        assert!(stream.set_dictionary(b"abc").is_err());
    }

    #[test]
    fn test_totals_and_checksum_accounting() {
        let input = b"totals totals totals totals";
        let mut stream = CompressStream::new(Framing::Zlib, 0).unwrap();
        let mut output = vec![0u8; 256];
        let progress = stream.compress(input, &mut output, true).unwrap();

        assert_eq!(stream.total_in(), input.len() as u64);
        assert_eq!(stream.total_out(), progress.produced as u64);
        assert_eq!(
            stream.checksum(),
            ferroflate_core::checksum::Adler32::checksum(input)
        );
    }

    #[test]
    fn test_tiny_output_yields_instead_of_failing() {
        let mut stream = CompressStream::new(Framing::Gzip, 0).unwrap();
        // One output byte cannot even hold the header; the call must
        // yield with partial progress, not error.
        let mut tiny = [0u8; 1];
        let progress = stream.compress(b"data", &mut tiny, true).unwrap();
        assert_eq!(progress.produced, 1);
        assert!(!progress.finished);

        // Feeding the unconsumed tail through successive tiny buffers
        // must eventually finish, byte for byte identical to one shot.
        let input = b"data";
        let mut consumed = progress.consumed;
        let mut collected = vec![tiny[0]];
        for _ in 0..10_000 {
            let progress = stream.compress(&input[consumed..], &mut tiny, true).unwrap();
            consumed += progress.consumed;
            collected.extend_from_slice(&tiny[..progress.produced]);
            if progress.finished {
                break;
            }
        }
        assert_eq!(consumed, input.len());
        assert_eq!(
            collected,
            memory_compress(input, Framing::Gzip, 0).unwrap()
        );
    }

    #[test]
    fn test_output_bound_holds_for_incompressible_data() {
        let mut data = Vec::with_capacity(70_000);
        let mut seed = 0xDEADBEEFu32;
        for _ in 0..70_000 {
            seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
            data.push((seed >> 24) as u8);
        }
        let out = memory_compress(&data, Framing::Gzip, 0).unwrap();
        assert!(out.len() <= compress_bound(data.len(), Framing::Gzip, 0));
        // Random data cannot shrink.
        assert!(out.len() >= data.len());
    }
}
