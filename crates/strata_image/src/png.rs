//! PNG container parsing and scanline reconstruction
//!
//! Reference: https://www.w3.org/TR/2003/REC-PNG-20031110/

use strata_memory::Arena;

use crate::deflate::inflate;
use crate::error::DecodeError;

const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Bytes per pixel; the decoder only speaks 8-bit RGBA
const BPP: usize = 4;

/// A decoded image
///
/// The pixel buffer lives in the return arena handed to [`decode`] and is
/// `width * height * 4` bytes of RGBA, rows top to bottom.
#[derive(Debug)]
pub struct Image<'a> {
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
}

/// The IHDR fields that survive validation
struct Ihdr {
    width: u32,
    height: u32,
}

/// Decode a PNG byte buffer
///
/// Pixels are allocated from `pixels_arena` so they outlive the call;
/// everything transient comes from `scratch`, which the caller may reclaim
/// immediately afterwards.
///
/// Only the engine's texture profile is accepted: 8-bit RGBA, not
/// interlaced, one IDAT chunk, zlib-wrapped single-block dynamic-Huffman
/// DEFLATE, filter method 0. Everything else returns an error.
pub fn decode<'r>(
    png: &[u8],
    pixels_arena: &'r Arena,
    scratch: &Arena,
) -> Result<Image<'r>, DecodeError> {
    if png.len() < PNG_SIGNATURE.len() || png[..PNG_SIGNATURE.len()] != PNG_SIGNATURE {
        return Err(DecodeError::BadSignature);
    }

    let mut ihdr: Option<Ihdr> = None;
    let mut idat: Option<&[u8]> = None;

    // After the signature the file is a run of chunks: big-endian length,
    // 4-byte type tag, contents, 4-byte CRC (not verified here).
    let mut at = PNG_SIGNATURE.len();
    while at < png.len() {
        let header = png
            .get(at..at + 8)
            .ok_or(DecodeError::UnexpectedEof("chunk header"))?;
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let tag = [header[4], header[5], header[6], header[7]];
        at += 8;

        let contents_end = at
            .checked_add(length)
            .ok_or(DecodeError::UnexpectedEof("chunk contents"))?;
        let contents = png
            .get(at..contents_end)
            .ok_or(DecodeError::UnexpectedEof("chunk contents"))?;

        log::debug!(
            "chunk {} ({} bytes)",
            core::str::from_utf8(&tag).unwrap_or("????"),
            length
        );

        match &tag {
            b"IHDR" => ihdr = Some(parse_ihdr(contents)?),
            b"IDAT" => {
                if idat.is_some() {
                    return Err(DecodeError::MultipleIdat);
                }
                idat = Some(contents);
            }
            // Palette, text, gamma and friends have nothing to say about
            // an RGBA texture; skip them by their declared length.
            _ => {}
        }

        png.get(contents_end..contents_end + 4)
            .ok_or(DecodeError::UnexpectedEof("chunk footer"))?;
        at = contents_end + 4;
    }

    let ihdr = ihdr.ok_or(DecodeError::MissingIhdr)?;
    let idat = idat.ok_or(DecodeError::MissingIdat)?;

    let width = ihdr.width as usize;
    let height = ihdr.height as usize;

    // The compressed stream carries a filter-type byte in front of every
    // scanline, so it is a little bigger than the image itself.
    let filtered_size = height * (1 + width * BPP);
    let filtered = inflate(idat, filtered_size, scratch)?;

    let pixels = pixels_arena.push_bytes(width * height * BPP);
    unfilter(filtered, pixels, width, height)?;

    Ok(Image {
        pixels,
        width: ihdr.width,
        height: ihdr.height,
    })
}

fn parse_ihdr(contents: &[u8]) -> Result<Ihdr, DecodeError> {
    if contents.len() < 13 {
        return Err(DecodeError::UnexpectedEof("IHDR chunk"));
    }

    let width = u32::from_be_bytes([contents[0], contents[1], contents[2], contents[3]]);
    let height = u32::from_be_bytes([contents[4], contents[5], contents[6], contents[7]]);
    let bit_depth = contents[8];
    let color_type = contents[9];
    let compression = contents[10];
    let filter = contents[11];
    let interlace = contents[12];

    log::debug!(
        "IHDR: {}x{} depth={} color={} interlace={}",
        width,
        height,
        bit_depth,
        color_type,
        interlace
    );

    if bit_depth != 8 {
        return Err(DecodeError::UnsupportedBitDepth(bit_depth));
    }
    if color_type != 6 {
        return Err(DecodeError::UnsupportedColorType(color_type));
    }
    if compression != 0 {
        return Err(DecodeError::NonStandardCompression(compression));
    }
    if filter != 0 {
        return Err(DecodeError::NonStandardFilterMethod(filter));
    }
    if interlace != 0 {
        return Err(DecodeError::Interlaced);
    }

    Ok(Ihdr { width, height })
}

/// Reverse the per-scanline filtering, writing reconstructed pixels into
/// `image`
///
/// Variable names (a = left, b = above, c = upper-left) follow section 9.2
/// of the PNG spec. All byte arithmetic wraps.
fn unfilter(
    stream: &[u8],
    image: &mut [u8],
    width: usize,
    height: usize,
) -> Result<(), DecodeError> {
    let stream_pitch = 1 + width * BPP;
    let image_pitch = width * BPP;
    debug_assert_eq!(stream.len(), height * stream_pitch);
    debug_assert_eq!(image.len(), height * image_pitch);

    for row in 0..height {
        let filter_type = stream[row * stream_pitch];
        let line = &stream[row * stream_pitch + 1..(row + 1) * stream_pitch];
        let out_row = row * image_pitch;

        match filter_type {
            // None
            0 => {
                image[out_row..out_row + image_pitch].copy_from_slice(line);
            }
            // Sub: add the byte of the pixel to the left.
            1 => {
                for x in 0..image_pitch {
                    let a = if x >= BPP { image[out_row + x - BPP] } else { 0 };
                    image[out_row + x] = line[x].wrapping_add(a);
                }
            }
            // Up: add the byte directly above.
            2 => {
                for x in 0..image_pitch {
                    let b = if row > 0 {
                        image[out_row + x - image_pitch]
                    } else {
                        0
                    };
                    image[out_row + x] = line[x].wrapping_add(b);
                }
            }
            // Average: none of our assets use it and it was never wired up.
            3 => return Err(DecodeError::UnsupportedFilter),
            // Paeth
            4 => {
                for x in 0..image_pitch {
                    let a = if x >= BPP { image[out_row + x - BPP] } else { 0 };
                    let b = if row > 0 {
                        image[out_row + x - image_pitch]
                    } else {
                        0
                    };
                    let c = if x >= BPP && row > 0 {
                        image[out_row + x - image_pitch - BPP]
                    } else {
                        0
                    };
                    image[out_row + x] = line[x].wrapping_add(paeth(a, b, c));
                }
            }
            other => return Err(DecodeError::InvalidFilter(other)),
        }
    }

    Ok(())
}

/// The Paeth predictor: whichever of left/above/upper-left is closest to
/// `a + b - c`, ties broken a, then b, then c
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
