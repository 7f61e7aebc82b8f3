//! End-to-end round-trips through independent third-party decoders.
//!
//! The compressor never decodes its own output; everything here goes
//! through `miniz_oxide` (raw deflate / zlib) or `flate2` (gzip and
//! dictionary streams) and must come back byte-identical.

use ferroflate_core::checksum::Adler32;
use ferroflate_deflate::{compress_bound, memory_compress, CompressStream, Framing};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Read;

fn inflate_raw(compressed: &[u8]) -> Vec<u8> {
    miniz_oxide::inflate::decompress_to_vec(compressed).expect("raw inflate failed")
}

fn inflate_zlib(compressed: &[u8]) -> Vec<u8> {
    miniz_oxide::inflate::decompress_to_vec_zlib(compressed).expect("zlib inflate failed")
}

fn inflate_gzip(compressed: &[u8]) -> Vec<u8> {
    let mut decoded = Vec::new();
    flate2::read::GzDecoder::new(compressed)
        .read_to_end(&mut decoded)
        .expect("gzip inflate failed");
    decoded
}

fn roundtrip(data: &[u8]) {
    for framing in [Framing::Deflate, Framing::Zlib, Framing::Gzip] {
        let compressed = memory_compress(data, framing, 0).unwrap();
        assert!(compressed.len() <= compress_bound(data.len(), framing, 0));
        let decoded = match framing {
            Framing::Deflate => inflate_raw(&compressed),
            Framing::Zlib => inflate_zlib(&compressed),
            Framing::Gzip => inflate_gzip(&compressed),
        };
        assert_eq!(
            decoded, data,
            "round-trip mismatch under {framing:?} for {} bytes",
            data.len()
        );
    }
}

#[test]
fn test_empty_input() {
    roundtrip(b"");

    // The zlib stream must still carry a header and the Adler-32 of
    // nothing (1).
    let compressed = memory_compress(b"", Framing::Zlib, 0).unwrap();
    assert!(compressed.len() >= 2 + 4);
    assert_eq!(&compressed[compressed.len() - 4..], &[0, 0, 0, 1]);
}

#[test]
fn test_inputs_below_min_match() {
    roundtrip(b"a");
    roundtrip(b"ab");
    roundtrip(&[0xFF]);
    roundtrip(&[0x00, 0x00]);
}

#[test]
fn test_small_texts() {
    roundtrip(b"Hello, World!");
    roundtrip(b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    roundtrip(b"the quick brown fox jumps over the lazy dog");
}

#[test]
fn test_single_byte_run_compresses_hard() {
    let data = vec![b'A'; 262_144];
    let compressed = memory_compress(&data, Framing::Gzip, 0).unwrap();
    assert_eq!(inflate_gzip(&compressed), data);
    assert!(
        compressed.len() < 512,
        "262144 x 'A' compressed to {} bytes",
        compressed.len()
    );
}

#[test]
fn test_random_input_falls_back_to_stored() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let data: Vec<u8> = (0..65_537).map(|_| rng.gen()).collect();

    let compressed = memory_compress(&data, Framing::Gzip, 0).unwrap();
    assert_eq!(inflate_gzip(&compressed), data);

    // Uniform random bytes cannot shrink; stored fallback keeps the
    // overhead to a few bytes per 64 KiB chunk plus framing.
    assert!(compressed.len() >= data.len());
    assert!(compressed.len() <= data.len() + 64);

    // The first block header after the 10-byte gzip header must be a
    // stored block (BTYPE bits 00).
    let first = compressed[10];
    assert_eq!(first & 0b110, 0, "expected a stored block, got {first:#04x}");
}

#[test]
fn test_mixed_structured_data() {
    let mut data = Vec::new();
    data.extend_from_slice(&b"<record><name>entry</name><value>42</value></record>".repeat(400));
    let mut rng = StdRng::seed_from_u64(7);
    data.extend((0..20_000).map(|_| -> u8 { rng.gen() }));
    data.extend_from_slice(&vec![0u8; 30_000]);
    roundtrip(&data);
}

#[test]
fn test_beats_greedy_deflate_on_text() {
    // Pseudo-English built from a word pool: repetitive enough to reward
    // good parsing, varied enough to keep the tables honest.
    let words: &[&str] = &[
        "the", "of", "and", "a", "to", "in", "is", "was", "he", "for", "it", "with", "as", "his",
        "on", "be", "at", "by", "had", "not", "are", "but", "from", "or", "have", "an", "they",
        "which", "one", "you", "were", "her", "all", "she", "there", "would", "their", "we",
    ];
    let mut rng = StdRng::seed_from_u64(0xE1);
    let mut text = String::new();
    while text.len() < 524_288 {
        text.push_str(words[rng.gen_range(0..words.len())]);
        text.push(if rng.gen_range(0..12) == 0 { '\n' } else { ' ' });
    }
    let data = text.as_bytes();

    let ours = memory_compress(data, Framing::Gzip, 0).unwrap();
    assert_eq!(inflate_gzip(&ours), data);

    let mut greedy = Vec::new();
    let mut encoder =
        flate2::write::GzEncoder::new(&mut greedy, flate2::Compression::default());
    std::io::Write::write_all(&mut encoder, data).unwrap();
    encoder.finish().unwrap();

    assert!(
        ours.len() < greedy.len(),
        "optimal parse ({}) should beat greedy deflate ({})",
        ours.len(),
        greedy.len()
    );
}

#[test]
fn test_dictionary_stream() {
    let dictionary = b"abcdefgh";
    let data = b"abcdefgh".repeat(1000);

    let mut stream = CompressStream::new(Framing::Zlib, 0).unwrap();
    stream.set_dictionary(dictionary).unwrap();

    let mut output = vec![0u8; compress_bound(data.len(), Framing::Zlib, 0)];
    let progress = stream.compress(&data, &mut output, true).unwrap();
    assert!(progress.finished);
    output.truncate(progress.produced);

    // FDICT must be set and the dictionary id must match.
    assert_ne!(output[1] & 0x20, 0);
    assert_eq!(
        u32::from_be_bytes([output[2], output[3], output[4], output[5]]),
        Adler32::checksum(dictionary)
    );

    // Decode the raw body with the dictionary preloaded.
    let body = &output[6..output.len() - 4];
    let mut decompress = flate2::Decompress::new(false);
    decompress.set_dictionary(dictionary).unwrap();
    let mut decoded = vec![0u8; data.len() + 64];
    decompress
        .decompress(body, &mut decoded, flate2::FlushDecompress::Finish)
        .unwrap();
    decoded.truncate(decompress.total_out() as usize);
    assert_eq!(decoded, data);

    // The trailer checksum covers the data only, not the dictionary.
    let trailer = u32::from_be_bytes([
        output[output.len() - 4],
        output[output.len() - 3],
        output[output.len() - 2],
        output[output.len() - 1],
    ]);
    assert_eq!(trailer, Adler32::checksum(&data));
}

#[test]
fn test_long_dictionary_is_truncated() {
    let mut dictionary = vec![0u8; 40_000];
    for (i, byte) in dictionary.iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }
    let data = b"tail data tail data tail data".to_vec();

    let mut stream = CompressStream::new(Framing::Zlib, 0).unwrap();
    stream.set_dictionary(&dictionary).unwrap();

    let mut output = vec![0u8; compress_bound(data.len(), Framing::Zlib, 0)];
    let progress = stream.compress(&data, &mut output, true).unwrap();
    output.truncate(progress.produced);

    // The advertised dictionary id must be of the truncated tail.
    assert_eq!(
        u32::from_be_bytes([output[2], output[3], output[4], output[5]]),
        Adler32::checksum(&dictionary[40_000 - 32_768..])
    );
}

#[test]
fn test_min_block_size_multi_block() {
    // 100 KiB through 32 KiB blocks: the suffix-array machinery must
    // rebuild per block and matches may reach into shifted history.
    let mut rng = StdRng::seed_from_u64(0xB10C);
    let mut data = Vec::with_capacity(100_000);
    while data.len() < 100_000 {
        let phrase_len = rng.gen_range(5..40);
        let phrase: Vec<u8> = (0..phrase_len).map(|_| rng.gen_range(b'a'..=b'z')).collect();
        let repeats = rng.gen_range(1..6);
        for _ in 0..repeats {
            data.extend_from_slice(&phrase);
            data.push(b' ');
        }
    }

    let compressed = memory_compress(&data, Framing::Zlib, 32_768).unwrap();
    assert_eq!(inflate_zlib(&compressed), data);
    assert!(compressed.len() < data.len());
}

#[test]
fn test_deterministic_output() {
    let mut rng = StdRng::seed_from_u64(99);
    let data: Vec<u8> = (0..50_000)
        .map(|i| if i % 3 == 0 { rng.gen() } else { b'x' })
        .collect();

    let first = memory_compress(&data, Framing::Gzip, 0).unwrap();
    let second = memory_compress(&data, Framing::Gzip, 0).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_gzip_trailer_fields() {
    let data = b"check the gzip trailer please".repeat(10);
    let compressed = memory_compress(&data, Framing::Gzip, 0).unwrap();

    let crc = u32::from_le_bytes(
        compressed[compressed.len() - 8..compressed.len() - 4]
            .try_into()
            .unwrap(),
    );
    let isize = u32::from_le_bytes(compressed[compressed.len() - 4..].try_into().unwrap());
    assert_eq!(crc, ferroflate_core::checksum::Crc32::compute(&data));
    assert_eq!(isize, data.len() as u32);
}

#[test]
fn test_many_shapes_roundtrip() {
    let mut rng = StdRng::seed_from_u64(0xCAFE);
    let shapes: Vec<Vec<u8>> = vec![
        (0u8..=255).collect(),
        (0u8..=255).rev().collect(),
        (0..10_000).map(|i| (i % 7) as u8).collect(),
        (0..30_000).map(|_| rng.gen_range(0..4) * 85u8).collect(),
        b"abab".repeat(5000),
        {
            // Match lengths straddling the 258 maximum
            let mut v = vec![9u8; 258 * 3 + 7];
            v.extend_from_slice(b"tail");
            v
        },
    ];
    for data in &shapes {
        roundtrip(data);
    }
}
