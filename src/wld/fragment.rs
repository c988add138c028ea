//! fragment records and the per-type reference catalog
//!
//! every record starts with `size: u32 | type: u32 | name_ref: i32`, where
//! `size` counts the name reference plus the payload. the payload layout
//! depends on the type; the catalog below knows where each known type keeps
//! its embedded references. all other types are opaque and reference-free.

use crate::error::{read_i32, read_u32, slice, Error, Result};

/// bytes before the payload: size, type, name reference
pub const FRAGMENT_HEADER_LEN: usize = 12;

pub const BITMAP_LIST: u32 = 0x04;
pub const BITMAP_REF: u32 = 0x05;
pub const SKELETON: u32 = 0x10;
pub const SKELETON_REF: u32 = 0x11;
pub const TRACK_DEF: u32 = 0x12;
pub const TRACK: u32 = 0x13;
pub const ACTOR: u32 = 0x14;
pub const MESH_REF: u32 = 0x2D;
pub const MATERIAL: u32 = 0x30;
pub const MATERIAL_LIST: u32 = 0x31;
pub const VERTEX_COLOR_REF: u32 = 0x33;
pub const MESH: u32 = 0x36;

/// payload layout family of a fragment type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Layout {
    /// one reference at the start of the payload (0x05, 0x11, 0x2D, 0x33)
    SimpleRef,
    /// flags, count, then one reference or a delay plus a reference list (0x04)
    BitmapList,
    /// bone hierarchy with per-bone child lists and a trailing mesh list (0x10)
    Skeleton,
    /// single track reference (0x13)
    Track,
    /// reference pair, skippable action blocks, optional mesh list (0x14)
    Actor,
    /// single reference after the render parameters (0x30)
    Material,
    /// flags, count, uniform reference list (0x31)
    MaterialList,
    /// material list and animated vertex references (0x36)
    Mesh,
    /// unknown type, passed through untouched
    Opaque,
}

impl Layout {
    /// layout for a type tag
    pub fn of(type_tag: u32) -> Self {
        match type_tag {
            BITMAP_REF | SKELETON_REF | MESH_REF | VERTEX_COLOR_REF => Layout::SimpleRef,
            BITMAP_LIST => Layout::BitmapList,
            SKELETON => Layout::Skeleton,
            TRACK => Layout::Track,
            ACTOR => Layout::Actor,
            MATERIAL => Layout::Material,
            MATERIAL_LIST => Layout::MaterialList,
            MESH => Layout::Mesh,
            _ => Layout::Opaque,
        }
    }

    /// total record length for a header `size` field
    pub fn record_len(size: u32) -> Result<usize> {
        if size < 4 {
            return Err(Error::Invalid(format!(
                "fragment size {} cannot hold its name reference",
                size
            )));
        }
        Ok(size as usize + 8)
    }

    /// payload offsets of every embedded reference field, in field order
    ///
    /// fails with [`Error::OutOfBounds`] when a counted sub-array would run
    /// past the end of the payload.
    pub fn reference_offsets(self, payload: &[u8]) -> Result<Vec<usize>> {
        let mut refs = RefWalk::new(payload);

        match self {
            Layout::SimpleRef | Layout::Track => refs.field(0)?,
            Layout::Material => refs.field(20)?,
            Layout::Mesh => {
                refs.field(4)?;
                refs.field(8)?;
            }
            Layout::MaterialList => {
                let count = read_u32(payload, 4)?;
                refs.list(8, count)?;
            }
            Layout::BitmapList => {
                let count = read_u32(payload, 4)?;
                if count > 1 {
                    // a 4-byte frame delay sits before the list
                    refs.list(12, count)?;
                } else {
                    refs.field(8)?;
                }
            }
            Layout::Skeleton => skeleton_refs(payload, &mut refs)?,
            Layout::Actor => actor_refs(payload, &mut refs)?,
            Layout::Opaque => {}
        }

        Ok(refs.offsets)
    }
}

fn skeleton_refs(payload: &[u8], refs: &mut RefWalk<'_>) -> Result<()> {
    let flags = read_u32(payload, 0)?;
    let bone_count = read_u32(payload, 4)?;
    refs.field(8)?;

    let mut pos = 12;
    if flags & 1 != 0 {
        pos += 12;
    }
    if flags & 2 != 0 {
        pos += 4;
    }

    for _ in 0..bone_count {
        // name_ref, flags, ref_a, ref_b, child count, children
        refs.field(pos)?;
        refs.field(pos + 8)?;
        refs.field(pos + 12)?;
        let children = read_u32(payload, pos + 16)? as usize;
        pos = advance(payload, pos, 20, children)?;
    }

    let mesh_count = read_u32(payload, pos)?;
    refs.list(pos + 4, mesh_count)
}

fn actor_refs(payload: &[u8], refs: &mut RefWalk<'_>) -> Result<()> {
    let flags = read_u32(payload, 0)?;
    refs.field(4)?;
    let action_count = read_u32(payload, 8)?;
    let mesh_count = read_u32(payload, 12)?;
    refs.field(16)?;

    if mesh_count == 0 {
        return Ok(());
    }

    let mut pos = 20;
    if flags & 1 != 0 {
        pos += 4;
    }
    if flags & 2 != 0 {
        pos += 4;
    }

    for _ in 0..action_count {
        // level count followed by 8 bytes per level
        let levels = read_u32(payload, pos)? as usize;
        pos = advance(payload, pos, 4, levels.saturating_mul(2))?;
    }

    refs.list(pos, mesh_count)
}

/// move past a block of `fixed` bytes plus `words` 4-byte values, staying inside the payload
fn advance(payload: &[u8], pos: usize, fixed: usize, words: usize) -> Result<usize> {
    let len = words
        .checked_mul(4)
        .and_then(|w| w.checked_add(fixed))
        .ok_or(Error::OutOfBounds {
            offset: pos,
            len: usize::MAX,
            size: payload.len(),
        })?;
    slice(payload, pos, len)?;
    Ok(pos + len)
}

/// collects bounds-checked reference field offsets
struct RefWalk<'a> {
    payload: &'a [u8],
    offsets: Vec<usize>,
}

impl<'a> RefWalk<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self {
            payload,
            offsets: Vec::new(),
        }
    }

    fn field(&mut self, offset: usize) -> Result<()> {
        slice(self.payload, offset, 4)?;
        self.offsets.push(offset);
        Ok(())
    }

    fn list(&mut self, offset: usize, count: u32) -> Result<()> {
        let end = advance(self.payload, offset, 0, count as usize)?;
        self.offsets.extend((offset..end).step_by(4));
        Ok(())
    }
}

/// one typed record of a resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    type_tag: u32,
    layout: Layout,
    name_ref: i32,
    payload: Vec<u8>,
    refs: Vec<usize>,
}

impl Fragment {
    /// build a fragment, locating its reference fields
    pub fn new(type_tag: u32, name_ref: i32, payload: Vec<u8>) -> Result<Self> {
        let layout = Layout::of(type_tag);
        let refs = layout.reference_offsets(&payload)?;
        Ok(Self {
            type_tag,
            layout,
            name_ref,
            payload,
            refs,
        })
    }

    /// parse the record starting at `offset`, returning it and its total length
    pub fn parse(buf: &[u8], offset: usize) -> Result<(Self, usize)> {
        let size = read_u32(buf, offset)?;
        let type_tag = read_u32(buf, offset + 4)?;
        let record_len = Layout::record_len(size)?;
        let record = slice(buf, offset, record_len)?;

        let name_ref = read_i32(record, 8)?;
        let payload = record[FRAGMENT_HEADER_LEN..].to_vec();

        let fragment = Self::new(type_tag, name_ref, payload).map_err(|e| match e {
            Error::OutOfBounds { offset: at, len, .. } => Error::OutOfBounds {
                offset: offset + FRAGMENT_HEADER_LEN + at,
                len,
                size: buf.len(),
            },
            other => other,
        })?;

        Ok((fragment, record_len))
    }

    pub fn type_tag(&self) -> u32 {
        self.type_tag
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn name_ref(&self) -> i32 {
        self.name_ref
    }

    pub fn set_name_ref(&mut self, name_ref: i32) {
        self.name_ref = name_ref;
    }

    /// raw payload after the record header
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// number of embedded reference fields
    pub fn reference_count(&self) -> usize {
        self.refs.len()
    }

    /// current value of every reference field, in field order
    pub fn references(&self) -> impl Iterator<Item = i32> + '_ {
        self.refs.iter().map(|&at| self.read_ref(at))
    }

    /// value of reference field `slot`
    pub fn reference(&self, slot: usize) -> Option<i32> {
        self.refs.get(slot).map(|&at| self.read_ref(at))
    }

    /// overwrite reference field `slot`
    pub fn set_reference(&mut self, slot: usize, value: i32) -> Result<()> {
        let at = *self.refs.get(slot).ok_or(Error::OutOfBounds {
            offset: slot,
            len: 1,
            size: self.refs.len(),
        })?;
        self.payload[at..at + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// encoded length, header included
    pub fn record_len(&self) -> usize {
        FRAGMENT_HEADER_LEN + self.payload.len()
    }

    /// append the encoded record to `out`
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.payload.len() as u32 + 4).to_le_bytes());
        out.extend_from_slice(&self.type_tag.to_le_bytes());
        out.extend_from_slice(&self.name_ref.to_le_bytes());
        out.extend_from_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.record_len());
        self.write_to(&mut out);
        out
    }

    fn read_ref(&self, at: usize) -> i32 {
        let b = &self.payload[at..at + 4];
        i32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn words(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn refs_of(type_tag: u32, payload: &[i32]) -> Vec<i32> {
        Fragment::new(type_tag, 0, words(payload))
            .unwrap()
            .references()
            .collect()
    }

    #[test]
    fn test_layout_lookup() {
        assert_eq!(Layout::of(0x05), Layout::SimpleRef);
        assert_eq!(Layout::of(0x2D), Layout::SimpleRef);
        assert_eq!(Layout::of(0x13), Layout::Track);
        assert_eq!(Layout::of(0x36), Layout::Mesh);
        assert_eq!(Layout::of(0x12), Layout::Opaque);
        assert_eq!(Layout::of(0xFFFF), Layout::Opaque);
    }

    #[test]
    fn test_record_len() {
        assert_eq!(Layout::record_len(4).unwrap(), 12);
        assert_eq!(Layout::record_len(20).unwrap(), 28);
        assert_eq!(Layout::record_len(3).unwrap_err().kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_simple_and_track() {
        assert_eq!(refs_of(BITMAP_REF, &[7, 0]), vec![7]);
        assert_eq!(refs_of(TRACK, &[-20, 4]), vec![-20]);
    }

    #[test]
    fn test_material_ref_after_parameters() {
        assert_eq!(refs_of(MATERIAL, &[2, 0, 0, 0, 0, 9, 0]), vec![9]);
    }

    #[test]
    fn test_mesh_pair() {
        assert_eq!(refs_of(MESH, &[0, 3, 4, 99, 99]), vec![3, 4]);
    }

    #[test]
    fn test_material_list() {
        assert_eq!(refs_of(MATERIAL_LIST, &[0, 3, 1, 2, 3]), vec![1, 2, 3]);
        assert_eq!(refs_of(MATERIAL_LIST, &[0, 0]), Vec::<i32>::new());
    }

    #[test]
    fn test_bitmap_list_single_and_animated() {
        assert_eq!(refs_of(BITMAP_LIST, &[0, 1, 5]), vec![5]);
        // count 0 still carries the single slot
        assert_eq!(refs_of(BITMAP_LIST, &[0, 0, 6]), vec![6]);
        // animated: delay then list
        assert_eq!(refs_of(BITMAP_LIST, &[8, 3, 100, 1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn test_skeleton() {
        let payload = [
            3, 2, 11, // flags (both prefixes), bones, ref
            0, 0, 0, // flag & 1 block
            0, // flag & 2 word
            -10, 0, 21, 22, 2, 1, 1, // bone 0 with two children
            -20, 0, 31, 32, 0, // bone 1, no children
            2, 41, 42, // mesh list
        ];
        assert_eq!(
            refs_of(SKELETON, &payload),
            vec![11, -10, 21, 22, -20, 31, 32, 41, 42]
        );
    }

    #[test]
    fn test_skeleton_child_count_overrun() {
        let payload = [0, 1, 11, -10, 0, 21, 22, 500];
        let err = Fragment::new(SKELETON, 0, words(&payload)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
    }

    #[test]
    fn test_actor_with_meshes() {
        let payload = [
            1, -5, 2, 2, 7, // flags, ref_a, actions, meshes, ref_b
            0, // flag & 1 word
            1, 0, 0, // action with one level
            0, // action with no levels
            51, 52, // meshes
        ];
        assert_eq!(refs_of(ACTOR, &payload), vec![-5, 7, 51, 52]);
    }

    #[test]
    fn test_actor_without_meshes_skips_tail() {
        assert_eq!(refs_of(ACTOR, &[0, -5, 9, 0, 7]), vec![-5, 7]);
    }

    #[test]
    fn test_opaque_has_no_refs() {
        assert_eq!(refs_of(TRACK_DEF, &[1, 2, 3]), Vec::<i32>::new());
        let frag = Fragment::new(0x99, 0, vec![1, 2, 3]).unwrap();
        assert_eq!(frag.reference_count(), 0);
    }

    #[test]
    fn test_truncated_known_type() {
        let err = Fragment::new(MATERIAL, 0, words(&[0, 0])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
        let err = Fragment::new(MATERIAL_LIST, 0, words(&[0, 3, 1])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
    }

    #[test]
    fn test_set_reference() {
        let mut frag = Fragment::new(MESH, -9, words(&[0, 3, 4])).unwrap();
        frag.set_reference(1, 12).unwrap();
        assert_eq!(frag.references().collect::<Vec<_>>(), vec![3, 12]);
        assert_eq!(frag.reference(1), Some(12));
        assert_eq!(frag.reference(2), None);
        assert!(frag.set_reference(2, 1).is_err());
    }

    #[test]
    fn test_parse_roundtrip() {
        let frag = Fragment::new(MESH_REF, -12, words(&[3, 0])).unwrap();
        let mut buf = vec![0xEE; 3];
        frag.write_to(&mut buf);

        let (parsed, len) = Fragment::parse(&buf, 3).unwrap();
        assert_eq!(len, frag.record_len());
        assert_eq!(parsed, frag);
        assert_eq!(&buf[3..], frag.to_bytes().as_slice());
    }

    #[test]
    fn test_parse_declared_length_past_end() {
        let frag = Fragment::new(0x22, 0, vec![0; 16]).unwrap();
        let bytes = frag.to_bytes();
        let err = Fragment::parse(&bytes[..bytes.len() - 1], 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
    }
}
