//! Transfer payload assembly.
//!
//! Before fragmentation the user payload is zlib-compressed and wrapped:
//!
//! ```text
//! "BOF" ‖ crc32(compressed) ‖ len_be32(compressed) ‖ ratio_u8 ‖ compressed ‖ "EOF"
//! ```
//!
//! The receive side scans its frame buffer for the BOF/EOF markers,
//! verifies the CRC-32 over the compressed bytes and inflates. The ratio
//! byte is `round(original / compressed * 10)` clamped to `0..=255`; it
//! only feeds progress statistics, never framing decisions.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::callsign::payload_crc32;

/// Marker bracketing the start of a transfer in the frame buffer.
pub const BOF: &[u8; 3] = b"BOF";

/// Marker bracketing the end of a transfer in the frame buffer.
pub const EOF: &[u8; 3] = b"EOF";

/// Header bytes between BOF and the compressed payload.
const WRAP_HEADER_LEN: usize = 4 + 4 + 1;

/// The payload section recovered from a completed frame buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct TransferPayload {
    pub crc: [u8; 4],
    pub length: u32,
    pub compression_ratio: u8,
    pub compressed: Vec<u8>,
}

/// Deflate a user payload (zlib format).
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writing into a Vec cannot fail.
    encoder.write_all(data).expect("zlib write to vec");
    encoder.finish().expect("zlib finish to vec")
}

/// Inflate a payload; errors surface as protocol failures upstream.
pub fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Compression ratio byte: `round(original / compressed * 10)`, clamped.
pub fn ratio_byte(original_len: usize, compressed_len: usize) -> u8 {
    if compressed_len == 0 {
        return 0;
    }
    let ratio = (original_len as f64 / compressed_len as f64) * 10.0;
    ratio.round().clamp(0.0, 255.0) as u8
}

/// Compress `data` and wrap it with markers, CRC and length.
///
/// Returns the wire buffer ready for fragmentation plus the compression
/// factor for statistics.
pub fn assemble(data: &[u8]) -> (Vec<u8>, f64) {
    let compressed = compress(data);
    let factor = data.len() as f64 / compressed.len().max(1) as f64;

    let mut out = Vec::with_capacity(BOF.len() + WRAP_HEADER_LEN + compressed.len() + EOF.len());
    out.extend_from_slice(BOF);
    out.extend_from_slice(&payload_crc32(&compressed));
    out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
    out.push(ratio_byte(data.len(), compressed.len()));
    out.extend_from_slice(&compressed);
    out.extend_from_slice(EOF);

    (out, factor)
}

/// Locate the BOF marker in a frame buffer.
pub fn find_bof(buffer: &[u8]) -> Option<usize> {
    buffer.windows(BOF.len()).position(|w| w == BOF)
}

/// Locate the EOF marker in a frame buffer.
pub fn find_eof(buffer: &[u8]) -> Option<usize> {
    buffer.windows(EOF.len()).position(|w| w == EOF)
}

/// Split the bytes between BOF and EOF into the payload section.
///
/// Returns `None` when the section is shorter than its own header.
pub fn parse_section(section: &[u8]) -> Option<TransferPayload> {
    if section.len() < WRAP_HEADER_LEN {
        return None;
    }
    Some(TransferPayload {
        crc: [section[0], section[1], section[2], section[3]],
        length: u32::from_be_bytes([section[4], section[5], section[6], section[7]]),
        compression_ratio: section[8],
        compressed: section[WRAP_HEADER_LEN..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_round_trip() {
        let data = b"The quick brown fox jumps over the lazy dog".repeat(20);
        let packed = compress(&data);
        assert!(packed.len() < data.len());
        assert_eq!(decompress(&packed).unwrap(), data);
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(decompress(b"definitely not zlib").is_err());
    }

    #[test]
    fn test_ratio_byte() {
        assert_eq!(ratio_byte(100, 50), 20);
        assert_eq!(ratio_byte(10, 10), 10);
        assert_eq!(ratio_byte(100_000, 10), 255); // clamped
        assert_eq!(ratio_byte(10, 0), 0);
    }

    #[test]
    fn test_assemble_layout() {
        let (wire, factor) = assemble(b"HELLO WORLD!!");
        assert!(factor > 0.0);
        assert_eq!(&wire[..3], BOF);
        assert_eq!(&wire[wire.len() - 3..], EOF);

        let bof = find_bof(&wire).unwrap();
        let eof = find_eof(&wire).unwrap();
        assert_eq!(bof, 0);

        let section = parse_section(&wire[bof + BOF.len()..eof]).unwrap();
        assert_eq!(section.length as usize, section.compressed.len());
        assert_eq!(section.crc, payload_crc32(&section.compressed));
        assert_eq!(decompress(&section.compressed).unwrap(), b"HELLO WORLD!!");
    }

    #[test]
    fn test_parse_section_too_short() {
        assert!(parse_section(&[1, 2, 3]).is_none());
    }

    #[test]
    fn test_assemble_one_byte_payload() {
        let (wire, _) = assemble(b"x");
        let bof = find_bof(&wire).unwrap();
        let eof = find_eof(&wire).unwrap();
        let section = parse_section(&wire[bof + 3..eof]).unwrap();
        assert_eq!(decompress(&section.compressed).unwrap(), b"x");
    }
}
