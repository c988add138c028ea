//! WLD resource: an obfuscated string pool plus a stream of typed fragments
//! forming a reference graph
//!
//! a reference is a signed integer: `0` is null, `n > 0` is the 1-based
//! position of a fragment, `n < 0` is `-offset` into the string pool.

mod fragment;
mod header;
mod rebuild;
mod refmap;
mod strings;

#[cfg(test)]
pub(crate) mod testutil;

use std::collections::HashMap;

use crate::error::{slice, Error, Result};

pub use fragment::{
    Fragment, Layout, ACTOR, BITMAP_LIST, BITMAP_REF, FRAGMENT_HEADER_LEN, MATERIAL,
    MATERIAL_LIST, MESH, MESH_REF, SKELETON, SKELETON_REF, TRACK, TRACK_DEF, VERTEX_COLOR_REF,
};
pub use header::{WldHeader, HEADER_LEN, VERSION_NEW, VERSION_OLD, WLD_MAGIC};
pub use rebuild::{rebuild, Decision, Identity, Rebuilder, Traversal};
pub use refmap::RefMap;
pub use strings::{string_at, toggle_obfuscation, StringPool, POOL_MARKER};

/// a parsed resource, indexed by position and by name
#[derive(Clone, Debug)]
pub struct Wld {
    header: WldHeader,
    strings: Vec<u8>,
    fragments: Vec<Fragment>,
    by_name: HashMap<Vec<u8>, u32>,
}

impl Wld {
    /// parse a resource blob
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = WldHeader::decode(data)?;
        if !header.is_known_version() {
            tracing::debug!(version = header.version, "unrecognised resource version");
        }

        let mut strings = slice(data, HEADER_LEN, header.strings_len as usize)?.to_vec();
        toggle_obfuscation(&mut strings);

        let declared = header.fragment_count as usize;
        let mut pos = HEADER_LEN + strings.len();
        let mut fragments = Vec::with_capacity(declared.min((data.len() - pos) / FRAGMENT_HEADER_LEN));

        while fragments.len() < declared {
            if pos == data.len() {
                return Err(Error::Invalid(format!(
                    "header declares {} fragments, data ends after {}",
                    declared,
                    fragments.len()
                )));
            }
            let (fragment, len) = Fragment::parse(data, pos)?;
            fragments.push(fragment);
            pos += len;
        }

        if pos != data.len() {
            if data.len() - pos >= FRAGMENT_HEADER_LEN && Fragment::parse(data, pos).is_ok() {
                return Err(Error::Invalid(format!(
                    "header declares {} fragments, more follow at offset {}",
                    declared, pos
                )));
            }
            tracing::debug!(trailing = data.len() - pos, "ignoring padding after last fragment");
        }

        let mut wld = Self {
            header,
            strings,
            fragments,
            by_name: HashMap::new(),
        };

        for index in 0..wld.fragments.len() {
            if let Some(name) = wld.name_by_ref(wld.fragments[index].name_ref()) {
                let name = name.to_vec();
                wld.by_name.entry(name).or_insert(index as u32 + 1);
            }
        }

        tracing::debug!(
            fragments = wld.fragments.len(),
            strings_len = wld.strings.len(),
            named = wld.by_name.len(),
            "parsed resource"
        );

        Ok(wld)
    }

    pub fn header(&self) -> &WldHeader {
        &self.header
    }

    /// decoded string pool
    pub fn strings(&self) -> &[u8] {
        &self.strings
    }

    /// number of fragments
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// fragments paired with their 1-based positions
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Fragment)> {
        self.fragments
            .iter()
            .enumerate()
            .map(|(i, f)| (i as u32 + 1, f))
    }

    /// fragment at 1-based position `index`
    pub fn fragment(&self, index: u32) -> Option<&Fragment> {
        let slot = (index as usize).checked_sub(1)?;
        self.fragments.get(slot)
    }

    /// string named by a negative reference
    pub fn name_by_ref(&self, name_ref: i32) -> Option<&[u8]> {
        if name_ref >= 0 {
            return None;
        }
        string_at(&self.strings, name_ref.unsigned_abs() as usize)
    }

    /// name of a fragment, if its name reference resolves
    pub fn fragment_name(&self, fragment: &Fragment) -> Option<&[u8]> {
        self.name_by_ref(fragment.name_ref())
    }

    /// 1-based position named by a reference: positive by index, negative by name
    pub fn index_by_ref(&self, reference: i32) -> Option<u32> {
        match reference {
            0 => None,
            r if r > 0 => self.fragment(r as u32).map(|_| r as u32),
            r => self.by_name.get(self.name_by_ref(r)?).copied(),
        }
    }

    /// fragment named by a reference: positive by index, negative by name
    pub fn fragment_by_ref(&self, reference: i32) -> Option<&Fragment> {
        self.index_by_ref(reference).and_then(|i| self.fragment(i))
    }

    /// first fragment carrying `name`, with its 1-based position
    pub fn fragment_by_name(&self, name: impl AsRef<[u8]>) -> Option<(u32, &Fragment)> {
        let index = *self.by_name.get(name.as_ref())?;
        self.fragment(index).map(|f| (index, f))
    }
}
