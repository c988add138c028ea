//! helpers for assembling resources in tests

use super::{Fragment, StringPool, WldHeader, VERSION_OLD};

/// little-endian encoding of a list of 4-byte fields
pub fn words(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// builds resource blobs whose string pool is laid out by [`StringPool`],
/// so a rebuild that interns names in the same order reproduces it exactly
pub struct WldBuilder {
    header: WldHeader,
    pool: StringPool,
    fragments: Vec<u8>,
    count: u32,
}

impl WldBuilder {
    pub fn new() -> Self {
        let mut header = WldHeader::new(VERSION_OLD);
        header.reserved_a = [11, 22];
        header.reserved_b = 33;
        Self {
            header,
            pool: StringPool::new().unwrap(),
            fragments: Vec::new(),
            count: 0,
        }
    }

    /// intern a name, returning its negative reference
    pub fn name(&mut self, name: &str) -> i32 {
        -(self.pool.add(name.as_bytes()).unwrap() as i32)
    }

    /// append a fragment, returning its 1-based position
    pub fn push(&mut self, type_tag: u32, name_ref: i32, payload: Vec<u8>) -> u32 {
        Fragment::new(type_tag, name_ref, payload)
            .unwrap()
            .write_to(&mut self.fragments);
        self.count += 1;
        self.count
    }

    pub fn build(self) -> Vec<u8> {
        let mut header = self.header;
        header.fragment_count = self.count;
        header.strings_len = self.pool.len() as u32;

        let mut out = header.encode().to_vec();
        out.extend_from_slice(&self.pool.to_obfuscated());
        out.extend_from_slice(&self.fragments);
        out
    }
}
