//! chunked DEFLATE block codec
//!
//! content is cut into chunks of at most [`BLOCK_SIZE`] bytes; each chunk is
//! stored as `deflated_len: u32 LE | inflated_len: u32 LE | zlib stream`.
//! an empty payload is an empty block stream.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{read_u32, slice, Error, Result};

/// maximum number of decompressed bytes per block
pub const BLOCK_SIZE: usize = 8192;

const BLOCK_HEADER_LEN: usize = 8;

/// compress `data` into a block stream appended to `out`
///
/// returns the number of bytes appended.
pub fn compress_into(data: &[u8], level: Compression, out: &mut Vec<u8>) -> Result<usize> {
    let start = out.len();

    for chunk in data.chunks(BLOCK_SIZE) {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(chunk.len() / 2 + 64), level);
        encoder.write_all(chunk).map_err(Error::Compression)?;
        let deflated = encoder.finish().map_err(Error::Compression)?;

        out.try_reserve(BLOCK_HEADER_LEN + deflated.len())?;
        out.extend_from_slice(&(deflated.len() as u32).to_le_bytes());
        out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
        out.extend_from_slice(&deflated);
    }

    Ok(out.len() - start)
}

/// compress `data` into a fresh block stream
pub fn compress(data: &[u8], level: Compression) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    compress_into(data, level, &mut out)?;
    Ok(out)
}

/// decompress a whole block stream, which must inflate to exactly `expected_len` bytes
///
/// every failure (truncated header, block overrunning the span, codec error,
/// length disagreement) is reported as [`Error::Invalid`].
pub fn decompress(stream: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut pos = 0;

    while pos < stream.len() {
        let deflated_len = read_u32(stream, pos).map_err(|e| corrupt(pos, e))? as usize;
        let inflated_len = read_u32(stream, pos + 4).map_err(|e| corrupt(pos, e))? as usize;

        if inflated_len > BLOCK_SIZE {
            return Err(Error::Invalid(format!(
                "block at {} declares {} inflated bytes (max {})",
                pos, inflated_len, BLOCK_SIZE
            )));
        }
        if out.len() + inflated_len > expected_len {
            return Err(Error::Invalid(format!(
                "block at {} inflates past the expected {} bytes",
                pos, expected_len
            )));
        }

        let body = slice(stream, pos + BLOCK_HEADER_LEN, deflated_len).map_err(|e| corrupt(pos, e))?;

        out.try_reserve(inflated_len)?;
        let before = out.len();
        ZlibDecoder::new(body)
            .take(inflated_len as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| Error::Invalid(format!("block at {}: {}", pos, e)))?;

        let produced = out.len() - before;
        if produced != inflated_len {
            return Err(Error::Invalid(format!(
                "block at {} inflated to {} bytes, header says {}",
                pos, produced, inflated_len
            )));
        }

        pos += BLOCK_HEADER_LEN + deflated_len;
    }

    if out.len() != expected_len {
        return Err(Error::Invalid(format!(
            "block stream inflated to {} bytes, expected {}",
            out.len(),
            expected_len
        )));
    }

    Ok(out)
}

/// total inflated length declared by the block headers of `stream`
pub fn inflated_len(stream: &[u8]) -> Result<usize> {
    let mut total = 0usize;
    let mut pos = 0;

    while pos < stream.len() {
        let deflated_len = read_u32(stream, pos).map_err(|e| corrupt(pos, e))? as usize;
        total += read_u32(stream, pos + 4).map_err(|e| corrupt(pos, e))? as usize;
        pos += BLOCK_HEADER_LEN + deflated_len;
    }

    if pos != stream.len() {
        return Err(Error::Invalid(format!(
            "last block runs {} bytes past the stream",
            pos - stream.len()
        )));
    }

    Ok(total)
}

fn corrupt(pos: usize, err: Error) -> Error {
    Error::Invalid(format!("truncated block at {}: {}", pos, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn test_roundtrip_sizes() {
        for len in [0, 1, 100, BLOCK_SIZE - 1, BLOCK_SIZE, BLOCK_SIZE + 1, 3 * BLOCK_SIZE] {
            let data = pattern(len);
            let stream = compress(&data, Compression::default()).unwrap();
            assert_eq!(decompress(&stream, len).unwrap(), data, "len {}", len);
        }
    }

    #[test]
    fn test_empty_payload_is_empty_stream() {
        let stream = compress(&[], Compression::default()).unwrap();
        assert!(stream.is_empty());
    }

    #[test]
    fn test_block_count_at_boundary() {
        let stream = compress(&pattern(BLOCK_SIZE), Compression::fast()).unwrap();
        let first_len = read_u32(&stream, 0).unwrap() as usize;
        // exactly one block
        assert_eq!(stream.len(), BLOCK_HEADER_LEN + first_len);
        assert_eq!(read_u32(&stream, 4).unwrap() as usize, BLOCK_SIZE);
    }

    #[test]
    fn test_compress_into_appends() {
        let mut out = vec![0xAA, 0xBB];
        let written = compress_into(b"hello", Compression::default(), &mut out).unwrap();
        assert_eq!(out.len(), 2 + written);
        assert_eq!(&out[..2], &[0xAA, 0xBB]);
        assert_eq!(decompress(&out[2..], 5).unwrap(), b"hello");
    }

    #[test]
    fn test_inflated_len() {
        let stream = compress(&pattern(2 * BLOCK_SIZE + 5), Compression::default()).unwrap();
        assert_eq!(inflated_len(&stream).unwrap(), 2 * BLOCK_SIZE + 5);
        assert_eq!(inflated_len(&[]).unwrap(), 0);
        assert!(inflated_len(&stream[..stream.len() - 1]).is_err());
    }

    #[test]
    fn test_wrong_expected_len() {
        let stream = compress(b"hello world", Compression::default()).unwrap();
        assert!(matches!(decompress(&stream, 10), Err(Error::Invalid(_))));
        assert!(matches!(decompress(&stream, 12), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_truncated_stream() {
        let stream = compress(&pattern(1000), Compression::default()).unwrap();
        let result = decompress(&stream[..stream.len() - 3], 1000);
        assert!(matches!(result, Err(Error::Invalid(_))));

        let result = decompress(&stream[..5], 1000);
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[test]
    fn test_garbage_body() {
        let mut stream = compress(&pattern(500), Compression::default()).unwrap();
        for b in stream[BLOCK_HEADER_LEN..].iter_mut() {
            *b = 0xFF;
        }
        assert!(matches!(decompress(&stream, 500), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_oversized_block_header() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&4u32.to_le_bytes());
        stream.extend_from_slice(&(BLOCK_SIZE as u32 + 1).to_le_bytes());
        stream.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(
            decompress(&stream, BLOCK_SIZE + 1),
            Err(Error::Invalid(_))
        ));
    }
}
