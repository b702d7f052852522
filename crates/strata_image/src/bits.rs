//! LSB-first bit reader over the DEFLATE payload

use crate::error::DecodeError;

/// Cursor into a DEFLATE byte stream, refilled a byte at a time into a
/// 32-bit buffer
///
/// The buffer is 32 bits while at most 16 are ever read at once, so a refill
/// always has at least 8 free bits and never drops any.
pub struct BitReader<'a> {
    bytes: &'a [u8],
    bit_buffer: u32,
    bit_count: u32,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            bit_buffer: 0,
            bit_count: 0,
        }
    }

    fn pull_next_byte(&mut self) -> Result<(), DecodeError> {
        let (&next, rest) = self
            .bytes
            .split_first()
            .ok_or(DecodeError::UnexpectedEof("deflate stream"))?;
        self.bytes = rest;

        debug_assert!(u32::BITS - self.bit_count >= 8);
        self.bit_buffer |= (next as u32) << self.bit_count;
        self.bit_count += 8;
        Ok(())
    }

    /// Read and discard `count` bits (1..16)
    pub fn consume(&mut self, count: u32) -> Result<u16, DecodeError> {
        debug_assert!(count > 0 && count < 16);

        while self.bit_count < count {
            self.pull_next_byte()?;
        }

        let result = (self.bit_buffer & ((1 << count) - 1)) as u16;
        self.bit_buffer >>= count;
        self.bit_count -= count;
        Ok(result)
    }

    /// Look at the next `count` bits without consuming them
    ///
    /// Past the end of the stream the missing bits read as zero: the final
    /// Huffman code of a block can sit in a partial trailing byte, and a
    /// fixed-width peek must still be able to reach it.
    pub fn peek(&mut self, count: u32) -> u16 {
        debug_assert!(count > 0 && count < 16);

        while self.bit_count < count && self.pull_next_byte().is_ok() {}

        (self.bit_buffer & ((1 << count) - 1)) as u16
    }

    /// Discard `count` bits that a prior [`BitReader::peek`] matched
    ///
    /// Errors if the stream does not actually hold them - a truncated file
    /// whose zero padding happened to look like a code lands here.
    pub fn discard(&mut self, count: u32) -> Result<(), DecodeError> {
        debug_assert!(count > 0 && count < 16);

        while self.bit_count < count {
            self.pull_next_byte()?;
        }

        self.bit_buffer >>= count;
        self.bit_count -= count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_is_lsb_first() {
        let mut bits = BitReader::new(&[0b1011_0100, 0b0000_0001]);

        assert_eq!(bits.consume(3).unwrap(), 0b100);
        assert_eq!(bits.consume(5).unwrap(), 0b10110);
        assert_eq!(bits.consume(2).unwrap(), 0b01);
    }

    #[test]
    fn test_reads_span_byte_boundaries() {
        let mut bits = BitReader::new(&[0xAB, 0xCD]);

        // 0xCDAB bit-reversed reading: low 12 bits of the 16-bit LE word.
        assert_eq!(bits.consume(12).unwrap(), 0xDAB);
        assert_eq!(bits.consume(4).unwrap(), 0xC);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let mut bits = BitReader::new(&[0b0101_0101]);

        assert_eq!(bits.peek(4), 0b0101);
        assert_eq!(bits.peek(4), 0b0101);
        assert_eq!(bits.consume(4).unwrap(), 0b0101);
    }

    #[test]
    fn test_peek_zero_pads_past_the_end() {
        let mut bits = BitReader::new(&[0b0000_0111]);

        bits.consume(5).unwrap();
        // Only 3 bits remain; the peek fills the rest with zeros.
        assert_eq!(bits.peek(9), 0);
    }

    #[test]
    fn test_consume_past_end_errors() {
        let mut bits = BitReader::new(&[0xFF]);

        bits.consume(8).unwrap();
        assert_eq!(
            bits.consume(1),
            Err(DecodeError::UnexpectedEof("deflate stream"))
        );
    }

    #[test]
    fn test_discard_requires_real_bits() {
        let mut bits = BitReader::new(&[0xFF]);

        assert_eq!(bits.peek(9), 0xFF);
        assert_eq!(
            bits.discard(9),
            Err(DecodeError::UnexpectedEof("deflate stream"))
        );
    }
}
