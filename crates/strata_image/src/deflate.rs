//! Zlib-wrapped DEFLATE decompression, dynamic-Huffman blocks only
//!
//! The engine's textures are authored as single-block streams, so BFINAL
//! must be set on the first block and only block type 0b10 is implemented.
//! Stored and fixed-Huffman blocks are rejected rather than decoded.

use strata_memory::Arena;

use crate::bits::BitReader;
use crate::error::DecodeError;
use crate::huffman::HuffmanTable;

/// Order in which the code-length-code lengths appear in the stream
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Base lengths for symbols 257..=285, and the extra bits to add on top
const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LENGTH_EXTRA_BITS: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Base distances for distance symbols 0..=29, and their extra bits
const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DISTANCE_EXTRA_BITS: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Inflate a zlib stream (the raw IDAT payload) into `expected_size` bytes
/// allocated from `scratch`
pub fn inflate<'s>(
    zlib: &[u8],
    expected_size: usize,
    scratch: &'s Arena,
) -> Result<&'s mut [u8], DecodeError> {
    // Two info bytes up front, a 4-byte adler32 checksum (not verified) at
    // the back, DEFLATE in between.
    if zlib.len() < 6 {
        return Err(DecodeError::UnexpectedEof("zlib stream"));
    }

    let cmf = zlib[0];
    let flg = zlib[1];
    let method = cmf & 0xF;
    let fdict = (flg >> 5) & 1;
    log::debug!("zlib stream: method={} fdict={}", method, fdict);

    if method != 8 {
        return Err(DecodeError::BadZlibMethod(method));
    }
    if fdict == 1 {
        return Err(DecodeError::PresetDictionary);
    }

    let mut bits = BitReader::new(&zlib[2..zlib.len() - 4]);
    let output = scratch.push_bytes(expected_size);

    let bfinal = bits.consume(1)?;
    if bfinal != 1 {
        return Err(DecodeError::MultipleBlocks);
    }

    let btype = bits.consume(2)?;
    match btype {
        // Stored and fixed-Huffman blocks never show up in our assets.
        0b00 | 0b01 => return Err(DecodeError::UnsupportedBlockType(btype as u8)),
        0b10 => {}
        _ => return Err(DecodeError::ReservedBlockType),
    }

    inflate_dynamic_block(&mut bits, output, scratch)?;
    Ok(output)
}

fn inflate_dynamic_block(
    bits: &mut BitReader,
    output: &mut [u8],
    scratch: &Arena,
) -> Result<(), DecodeError> {
    // The Huffman codes for the data are themselves described by Huffman
    // coded code lengths: HLIT and HDIST size the two real alphabets, HCLEN
    // sizes the meta alphabet that decodes their code lengths.
    let hlit = bits.consume(5)? as usize + 257;
    let hdist = bits.consume(5)? as usize + 1;
    let hclen = bits.consume(4)? as usize + 4;

    let mut meta_lengths = [0u16; CODE_LENGTH_ORDER.len()];
    for &symbol in CODE_LENGTH_ORDER.iter().take(hclen) {
        meta_lengths[symbol] = bits.consume(3)?;
    }
    let meta_table = HuffmanTable::build(&meta_lengths, scratch)?;

    let literal_lengths = scratch.push_slice(hlit, 0u16);
    decode_code_lengths(bits, &meta_table, literal_lengths)?;
    let distance_lengths = scratch.push_slice(hdist, 0u16);
    decode_code_lengths(bits, &meta_table, distance_lengths)?;

    let literal_table = HuffmanTable::build(literal_lengths, scratch)?;
    let distance_table = HuffmanTable::build(distance_lengths, scratch)?;

    let mut cursor = 0;
    loop {
        let value = literal_table.decode_symbol(bits)?;

        if value < 256 {
            if cursor >= output.len() {
                return Err(DecodeError::CorruptStream("output overrun"));
            }
            output[cursor] = value as u8;
            cursor += 1;
        } else if value == 256 {
            // End of block: the output must land exactly on the image size.
            if cursor != output.len() {
                return Err(DecodeError::SizeMismatch {
                    got: cursor,
                    expected: output.len(),
                });
            }
            return Ok(());
        } else {
            if value > 285 {
                return Err(DecodeError::CorruptStream("length symbol out of range"));
            }
            let length_idx = (value - 257) as usize;
            let mut length = LENGTH_BASE[length_idx] as usize;
            let extra = LENGTH_EXTRA_BITS[length_idx];
            if extra > 0 {
                length += bits.consume(extra as u32)? as usize;
            }

            let distance_symbol = distance_table.decode_symbol(bits)?;
            if distance_symbol > 29 {
                return Err(DecodeError::CorruptStream("distance symbol out of range"));
            }
            let mut distance = DISTANCE_BASE[distance_symbol as usize] as usize;
            let extra = DISTANCE_EXTRA_BITS[distance_symbol as usize];
            if extra > 0 {
                distance += bits.consume(extra as u32)? as usize;
            }

            if distance > cursor {
                return Err(DecodeError::CorruptStream(
                    "back-reference before stream start",
                ));
            }
            if cursor + length > output.len() {
                return Err(DecodeError::CorruptStream("output overrun"));
            }

            // Byte at a time on purpose: a run longer than its distance
            // re-reads bytes this same copy just wrote.
            let mut back = cursor - distance;
            for _ in 0..length {
                output[cursor] = output[back];
                cursor += 1;
                back += 1;
            }
        }
    }
}

/// Decode `lengths.len()` code lengths using the meta table and its
/// run-length escapes
fn decode_code_lengths(
    bits: &mut BitReader,
    meta_table: &HuffmanTable,
    lengths: &mut [u16],
) -> Result<(), DecodeError> {
    let mut idx = 0;
    while idx < lengths.len() {
        let symbol = meta_table.decode_symbol(bits)?;
        match symbol {
            // 0-15 are literal code lengths.
            0..=15 => {
                lengths[idx] = symbol;
                idx += 1;
            }
            // 16: repeat the previous length 3-6 times.
            16 => {
                if idx == 0 {
                    return Err(DecodeError::CorruptStream("repeat with no previous length"));
                }
                let repeats = 3 + bits.consume(2)? as usize;
                if idx + repeats > lengths.len() {
                    return Err(DecodeError::CorruptStream("code length run overflows"));
                }
                let previous = lengths[idx - 1];
                lengths[idx..idx + repeats].fill(previous);
                idx += repeats;
            }
            // 17: repeat zero 3-10 times.
            17 => {
                let repeats = 3 + bits.consume(3)? as usize;
                if idx + repeats > lengths.len() {
                    return Err(DecodeError::CorruptStream("code length run overflows"));
                }
                lengths[idx..idx + repeats].fill(0);
                idx += repeats;
            }
            // 18: repeat zero 11-138 times.
            18 => {
                let repeats = 11 + bits.consume(7)? as usize;
                if idx + repeats > lengths.len() {
                    return Err(DecodeError::CorruptStream("code length run overflows"));
                }
                lengths[idx..idx + repeats].fill(0);
                idx += repeats;
            }
            _ => return Err(DecodeError::CorruptStream("invalid code length symbol")),
        }
    }
    Ok(())
}
