//! Decode failures
//!
//! Every variant is reachable from file bytes alone. Malformed or merely
//! unsupported input reports an error; panics are reserved for misuse of the
//! decoder itself (an undersized scratch arena, for instance).

use thiserror::Error;

/// Why a PNG byte buffer could not be decoded
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer does not start with the PNG signature
    #[error("not a PNG file (bad signature)")]
    BadSignature,

    /// The buffer ends in the middle of the named structure
    #[error("file truncated inside {0}")]
    UnexpectedEof(&'static str),

    /// Bit depth other than 8 bits per channel
    #[error("unsupported bit depth {0}, only 8-bit channels")]
    UnsupportedBitDepth(u8),

    /// Color type other than RGBA
    #[error("unsupported color type {0}, only RGBA (6)")]
    UnsupportedColorType(u8),

    /// IHDR declares a compression method other than 0
    #[error("non-standard compression method {0} in IHDR")]
    NonStandardCompression(u8),

    /// IHDR declares a filter method other than 0
    #[error("non-standard filter method {0} in IHDR")]
    NonStandardFilterMethod(u8),

    /// Interlaced image
    #[error("interlaced images are not supported")]
    Interlaced,

    /// No IHDR chunk in the file
    #[error("missing IHDR chunk")]
    MissingIhdr,

    /// No IDAT chunk in the file
    #[error("missing IDAT chunk")]
    MissingIdat,

    /// More than one IDAT chunk
    #[error("multiple IDAT chunks are not supported")]
    MultipleIdat,

    /// The zlib stream is not DEFLATE
    #[error("zlib compression method {0} is not deflate")]
    BadZlibMethod(u8),

    /// The zlib stream wants a preset dictionary
    #[error("zlib preset dictionaries are not supported")]
    PresetDictionary,

    /// The first DEFLATE block is not flagged final
    #[error("multi-block deflate streams are not supported")]
    MultipleBlocks,

    /// Stored or fixed-Huffman DEFLATE block
    #[error("unsupported deflate block type {0}")]
    UnsupportedBlockType(u8),

    /// DEFLATE block type 0b11
    #[error("reserved deflate block type")]
    ReservedBlockType,

    /// A Huffman code is too long for the flat lookup table
    #[error("huffman code longer than 9 bits")]
    HuffmanCodeTooLong,

    /// The DEFLATE payload contradicts itself
    #[error("corrupt deflate stream: {0}")]
    CorruptStream(&'static str),

    /// The block decoded to the wrong number of bytes
    #[error("decompressed {got} bytes, image needs {expected}")]
    SizeMismatch { got: usize, expected: usize },

    /// Scanline filter type 3 (Average)
    #[error("scanline filter \"Average\" is not implemented")]
    UnsupportedFilter,

    /// Scanline filter type above 4
    #[error("invalid scanline filter type {0}")]
    InvalidFilter(u8),
}
