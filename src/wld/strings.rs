//! string pool storage and its on-disk obfuscation

use std::collections::HashMap;

use crate::error::{Error, Result};

/// key of the byte-wise XOR applied to the stored string pool
const XOR_KEY: [u8; 8] = [0x95, 0x3A, 0xC5, 0x2A, 0x95, 0x7A, 0x95, 0x6A];

/// preamble written at offset 0 of every pool this crate builds
pub const POOL_MARKER: &[u8] = b"pfsgraph";

/// apply (or remove) the pool obfuscation in place; the transform is its own inverse
pub fn toggle_obfuscation(buf: &mut [u8]) {
    for (b, k) in buf.iter_mut().zip(XOR_KEY.iter().cycle()) {
        *b ^= k;
    }
}

/// NUL-terminated string starting at `offset` in a decoded pool
///
/// a string running to the end of the pool without a terminator is
/// returned up to the end.
pub fn string_at(pool: &[u8], offset: usize) -> Option<&[u8]> {
    let rest = pool.get(offset..)?;
    if rest.is_empty() {
        return None;
    }
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// grow `buf` so it can take `additional` more bytes, keeping its capacity
/// at the next power of two of the required length
pub(crate) fn reserve_pow2(buf: &mut Vec<u8>, additional: usize) -> Result<()> {
    let needed = buf
        .len()
        .checked_add(additional)
        .ok_or_else(|| Error::Fatal("buffer length overflow".to_string()))?;
    if needed <= buf.capacity() {
        return Ok(());
    }

    let target = needed
        .checked_next_power_of_two()
        .ok_or_else(|| Error::Fatal("buffer length overflow".to_string()))?;
    buf.try_reserve_exact(target - buf.len())?;
    Ok(())
}

/// append-only, deduplicating pool of NUL-terminated strings
#[derive(Clone, Debug)]
pub struct StringPool {
    data: Vec<u8>,
    index: HashMap<Vec<u8>, u32>,
}

impl StringPool {
    /// create a pool holding only the marker preamble
    pub fn new() -> Result<Self> {
        let mut data = Vec::new();
        reserve_pow2(&mut data, POOL_MARKER.len() + 1)?;
        data.extend_from_slice(POOL_MARKER);
        data.push(0);

        Ok(Self {
            data,
            index: HashMap::new(),
        })
    }

    /// add a string, returning its byte offset; a string already present
    /// returns its existing offset
    pub fn add(&mut self, s: &[u8]) -> Result<u32> {
        if let Some(&offset) = self.index.get(s) {
            return Ok(offset);
        }
        if s.contains(&0) {
            return Err(Error::Invalid(format!(
                "string contains NUL: {:?}",
                String::from_utf8_lossy(s)
            )));
        }

        let offset = self.data.len();
        if offset + s.len() + 1 > i32::MAX as usize {
            return Err(Error::Fatal(format!(
                "string pool offset {} exceeds the reference range",
                offset
            )));
        }
        let offset = offset as u32;

        reserve_pow2(&mut self.data, s.len() + 1)?;
        self.index.try_reserve(1)?;
        self.data.extend_from_slice(s);
        self.data.push(0);
        self.index.insert(s.to_vec(), offset);

        Ok(offset)
    }

    /// offset of a string already in the pool
    pub fn offset_of(&self, s: &[u8]) -> Option<u32> {
        self.index.get(s).copied()
    }

    /// string stored at `offset`
    pub fn get(&self, offset: u32) -> Option<&[u8]> {
        string_at(&self.data, offset as usize)
    }

    /// pool length in bytes, preamble included
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// true when only the preamble is present
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// decoded pool bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// pool bytes as stored on disk
    pub fn to_obfuscated(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        toggle_obfuscation(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obfuscation_is_involution() {
        let original = b"HUMAN_ACTORDEF\0ELF_TRACK\0".to_vec();
        let mut buf = original.clone();
        toggle_obfuscation(&mut buf);
        assert_ne!(buf, original);
        assert_eq!(buf[0], b'H' ^ 0x95);
        assert_eq!(buf[8], original[8] ^ 0x95);
        toggle_obfuscation(&mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn test_marker_preamble() {
        let pool = StringPool::new().unwrap();
        assert_eq!(pool.len(), POOL_MARKER.len() + 1);
        assert_eq!(pool.get(0), Some(POOL_MARKER));
        assert!(pool.is_empty());
        assert_eq!(pool.offset_of(POOL_MARKER), None);
    }

    #[test]
    fn test_dedup() {
        let mut pool = StringPool::new().unwrap();
        let first = pool.add(b"LEAF").unwrap();
        let len = pool.len();
        let second = pool.add(b"LEAF").unwrap();

        assert_eq!(first, second);
        assert_eq!(pool.len(), len);
        assert_eq!(first as usize, POOL_MARKER.len() + 1);
        assert_eq!(pool.get(first), Some(&b"LEAF"[..]));
    }

    #[test]
    fn test_distinct_strings_get_distinct_offsets() {
        let mut pool = StringPool::new().unwrap();
        let a = pool.add(b"A").unwrap();
        let b = pool.add(b"BB").unwrap();
        assert_eq!(b, a + 2);
        assert_eq!(pool.offset_of(b"BB"), Some(b));
    }

    #[test]
    fn test_empty_string() {
        let mut pool = StringPool::new().unwrap();
        let offset = pool.add(b"").unwrap();
        assert_eq!(pool.get(offset), Some(&b""[..]));
        assert_eq!(pool.add(b"").unwrap(), offset);
    }

    #[test]
    fn test_nul_rejected() {
        let mut pool = StringPool::new().unwrap();
        assert!(matches!(pool.add(b"a\0b"), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_capacity_is_next_power_of_two() {
        let mut pool = StringPool::new().unwrap();
        for i in 0..200 {
            pool.add(format!("STRING_{:04}", i).as_bytes()).unwrap();
            assert_eq!(pool.capacity(), pool.len().next_power_of_two());
        }
    }

    #[test]
    fn test_string_at_edges() {
        let pool = b"AB\0CD";
        assert_eq!(string_at(pool, 0), Some(&b"AB"[..]));
        assert_eq!(string_at(pool, 2), Some(&b""[..]));
        assert_eq!(string_at(pool, 3), Some(&b"CD"[..]));
        assert_eq!(string_at(pool, 5), None);
        assert_eq!(string_at(pool, 99), None);
    }

    #[test]
    fn test_obfuscated_output() {
        let mut pool = StringPool::new().unwrap();
        pool.add(b"NAME").unwrap();
        let mut stored = pool.to_obfuscated();
        toggle_obfuscation(&mut stored);
        assert_eq!(stored, pool.as_bytes());
    }
}
